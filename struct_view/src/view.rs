/* Zero-copy record views
 *
 * A RecordView binds record metadata to a byte range of some buffer. Every
 * accessor re-derives the member position from the current bytes, so a
 * counted-by array always reflects the current value of its counter.
 */

use crate::array::{ArrayView, RecordArray};
use crate::codec::deserialize;
use crate::value::RecordValue;
use std::sync::Arc;
use struct_layout::{
    check_bounds, size_of_instance, LayoutError, LayoutResult, MemberDescriptor, MemberType,
    Placement, Primitive, PrimitiveType, RecordMetadata, RuntimeLayout, Scalar,
};

/* A record instance over `buf[offset..]` */
#[derive(Debug, Clone)]
pub struct RecordView<B> {
    meta: Arc<RecordMetadata>,
    buf: B,
    offset: usize,
}

/* Resolves where `name` currently lives, relative to the record start */
fn locate<'m>(
    meta: &'m RecordMetadata,
    buf: &[u8],
    start: usize,
    name: &str,
) -> LayoutResult<(&'m MemberDescriptor, Placement)> {
    let desc = meta.member(name)?;
    let placement = if desc.offset_is_static && !desc.is_dynamic() {
        Placement {
            offset: desc.static_offset,
            size: desc.byte_size,
            length: desc.fixed_length().unwrap_or(1),
        }
    } else {
        RuntimeLayout::resolve(meta, buf, start)?.placement(desc)
    };
    check_bounds(buf.len(), start + placement.offset, placement.size)?;
    Ok((desc, placement))
}

fn describe(desc: &MemberDescriptor) -> String {
    match &desc.length {
        None => desc.ty.name().to_string(),
        Some(_) => format!("{}[]", desc.ty.name()),
    }
}

fn mismatch(expected: &str, desc: &MemberDescriptor) -> LayoutError {
    LayoutError::TypeMismatch {
        expected: expected.to_string(),
        found: describe(desc),
    }
}

fn scalar_primitive(desc: &MemberDescriptor) -> LayoutResult<PrimitiveType> {
    match (&desc.ty, desc.is_array()) {
        (MemberType::Primitive(prim), false) => Ok(*prim),
        _ => Err(mismatch("primitive scalar", desc)),
    }
}

fn array_primitive(desc: &MemberDescriptor) -> LayoutResult<PrimitiveType> {
    match (&desc.ty, desc.is_array()) {
        (MemberType::Primitive(prim), true) => Ok(*prim),
        _ => Err(mismatch("primitive array", desc)),
    }
}

fn byte_array(desc: &MemberDescriptor) -> LayoutResult<()> {
    match array_primitive(desc)?.byte_width() {
        1 => Ok(()),
        _ => Err(mismatch("byte array", desc)),
    }
}

fn nested_record(desc: &MemberDescriptor, array: bool) -> LayoutResult<&Arc<RecordMetadata>> {
    match (&desc.ty, desc.is_array() == array) {
        (MemberType::Record(meta), true) => Ok(meta),
        _ if array => Err(mismatch("record array", desc)),
        _ => Err(mismatch("record", desc)),
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    &bytes[..end]
}

/* Text stored in a byte array, up to the trailing NUL padding */
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(trim_padding(bytes)).into_owned()
}

/* Copies the `declared` prefix of `value` to `dst[at..]` */
pub(crate) fn copy_record<S: AsRef<[u8]>>(
    declared: &Arc<RecordMetadata>,
    dst: &mut [u8],
    at: usize,
    value: &RecordView<S>,
) -> LayoutResult<()> {
    if !value.meta.is_a(declared) {
        return Err(LayoutError::TypeMismatch {
            expected: declared.name().to_string(),
            found: value.meta.name().to_string(),
        });
    }
    let src = value.buf.as_ref();
    let size = size_of_instance(declared, src, value.offset)?;
    check_bounds(src.len(), value.offset, size)?;
    if declared.is_dynamic() {
        /* The destination keeps its neighbours: the extents must agree */
        let current = size_of_instance(declared, dst, at)?;
        if current != size {
            return Err(LayoutError::invalid_value(
                declared.name(),
                format!("{size}-byte instance does not fit the {current}-byte slot"),
            ));
        }
    }
    check_bounds(dst.len(), at, size)?;
    dst[at..at + size].copy_from_slice(&src[value.offset..value.offset + size]);
    Ok(())
}

impl<B: AsRef<[u8]>> RecordView<B> {
    /* Binds `meta` to the start of `buf` */
    pub fn new(meta: Arc<RecordMetadata>, buf: B) -> LayoutResult<Self> {
        Self::at(meta, buf, 0)
    }

    /* Binds `meta` to `buf[offset..]`; the static part must fit */
    pub fn at(meta: Arc<RecordMetadata>, buf: B, offset: usize) -> LayoutResult<Self> {
        check_bounds(buf.as_ref().len(), offset, meta.static_size())?;
        Ok(Self { meta, buf, offset })
    }

    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.meta
    }

    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    pub fn buffer(&self) -> &B {
        &self.buf
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    /* Current size, following counters for dynamic records */
    pub fn size(&self) -> LayoutResult<usize> {
        size_of_instance(&self.meta, self.buf.as_ref(), self.offset)
    }

    /* The bytes of this instance */
    pub fn as_bytes(&self) -> LayoutResult<&[u8]> {
        let size = self.size()?;
        let buf = self.buf.as_ref();
        check_bounds(buf.len(), self.offset, size)?;
        Ok(&buf[self.offset..self.offset + size])
    }

    /* Offset of `name` relative to the start of this record */
    pub fn offset_of(&self, name: &str) -> LayoutResult<usize> {
        locate(&self.meta, self.buf.as_ref(), self.offset, name).map(|(_, p)| p.offset)
    }

    /* Element count of `name`; 1 for scalars */
    pub fn length_of(&self, name: &str) -> LayoutResult<usize> {
        locate(&self.meta, self.buf.as_ref(), self.offset, name).map(|(_, p)| p.length)
    }

    pub fn get(&self, name: &str) -> LayoutResult<Scalar> {
        let buf = self.buf.as_ref();
        let (desc, placement) = locate(&self.meta, buf, self.offset, name)?;
        let prim = scalar_primitive(desc)?;
        prim.read(buf, self.offset + placement.offset, desc.little_endian)
    }

    pub fn get_as<T: Primitive>(&self, name: &str) -> LayoutResult<T> {
        self.get(name).map(T::from_scalar)
    }

    pub fn array(&self, name: &str) -> LayoutResult<ArrayView<&[u8]>> {
        let buf = self.buf.as_ref();
        let (desc, placement) = locate(&self.meta, buf, self.offset, name)?;
        let prim = array_primitive(desc)?;
        ArrayView::new(
            buf,
            self.offset + placement.offset,
            placement.length,
            prim,
            desc.little_endian,
        )
    }

    /* Raw bytes of any member */
    pub fn bytes(&self, name: &str) -> LayoutResult<&[u8]> {
        let buf = self.buf.as_ref();
        let (_, placement) = locate(&self.meta, buf, self.offset, name)?;
        let at = self.offset + placement.offset;
        Ok(&buf[at..at + placement.size])
    }

    /* Contents of a byte or char array as text */
    pub fn text(&self, name: &str) -> LayoutResult<String> {
        let (desc, _) = locate(&self.meta, self.buf.as_ref(), self.offset, name)?;
        byte_array(desc)?;
        self.bytes(name).map(decode_text)
    }

    /* Nested view over a record-typed member, sharing this buffer */
    pub fn record(&self, name: &str) -> LayoutResult<RecordView<&[u8]>> {
        let buf = self.buf.as_ref();
        let (desc, placement) = locate(&self.meta, buf, self.offset, name)?;
        let nested = nested_record(desc, false)?;
        RecordView::at(Arc::clone(nested), buf, self.offset + placement.offset)
    }

    pub fn records(&self, name: &str) -> LayoutResult<RecordArray<&[u8]>> {
        let buf = self.buf.as_ref();
        let (desc, placement) = locate(&self.meta, buf, self.offset, name)?;
        let element = nested_record(desc, true)?;
        Ok(RecordArray::new(
            Arc::clone(element),
            buf,
            self.offset + placement.offset,
            placement.length,
        ))
    }

    /* Copies this instance into an object graph */
    pub fn to_value(&self) -> LayoutResult<RecordValue> {
        let mut value = RecordValue::new(Arc::clone(&self.meta));
        deserialize(&mut value, self.as_bytes()?)?;
        Ok(value)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RecordView<B> {
    pub fn set(&mut self, name: &str, value: impl Into<Scalar>) -> LayoutResult<()> {
        let meta = Arc::clone(&self.meta);
        let (desc, placement) = locate(&meta, self.buf.as_ref(), self.offset, name)?;
        let prim = scalar_primitive(desc)?;
        let at = self.offset + placement.offset;
        prim.write(self.buf.as_mut(), at, desc.little_endian, value.into())
    }

    pub fn array_mut(&mut self, name: &str) -> LayoutResult<ArrayView<&mut [u8]>> {
        let meta = Arc::clone(&self.meta);
        let (desc, placement) = locate(&meta, self.buf.as_ref(), self.offset, name)?;
        let prim = array_primitive(desc)?;
        ArrayView::new(
            self.buf.as_mut(),
            self.offset + placement.offset,
            placement.length,
            prim,
            desc.little_endian,
        )
    }

    pub fn bytes_mut(&mut self, name: &str) -> LayoutResult<&mut [u8]> {
        let (_, placement) = locate(&self.meta, self.buf.as_ref(), self.offset, name)?;
        let at = self.offset + placement.offset;
        Ok(&mut self.buf.as_mut()[at..at + placement.size])
    }

    /* Copies `data` into a byte array member and zero-fills the remainder */
    pub fn set_bytes(&mut self, name: &str, data: &[u8]) -> LayoutResult<()> {
        let (desc, _) = locate(&self.meta, self.buf.as_ref(), self.offset, name)?;
        byte_array(desc)?;
        let dst = self.bytes_mut(name)?;
        if data.len() > dst.len() {
            return Err(LayoutError::invalid_value(
                name,
                format!("{} bytes do not fit in {}", data.len(), dst.len()),
            ));
        }
        dst[..data.len()].copy_from_slice(data);
        dst[data.len()..].fill(0);
        Ok(())
    }

    pub fn set_text(&mut self, name: &str, text: &str) -> LayoutResult<()> {
        self.set_bytes(name, text.as_bytes())
    }

    pub fn record_mut(&mut self, name: &str) -> LayoutResult<RecordView<&mut [u8]>> {
        let meta = Arc::clone(&self.meta);
        let (desc, placement) = locate(&meta, self.buf.as_ref(), self.offset, name)?;
        let nested = nested_record(desc, false)?;
        RecordView::at(
            Arc::clone(nested),
            self.buf.as_mut(),
            self.offset + placement.offset,
        )
    }

    pub fn records_mut(&mut self, name: &str) -> LayoutResult<RecordArray<&mut [u8]>> {
        let meta = Arc::clone(&self.meta);
        let (desc, placement) = locate(&meta, self.buf.as_ref(), self.offset, name)?;
        let element = nested_record(desc, true)?;
        Ok(RecordArray::new(
            Arc::clone(element),
            self.buf.as_mut(),
            self.offset + placement.offset,
            placement.length,
        ))
    }

    /* Copies another instance into a record-typed member.
     *
     * The source may be the declared type or any record extending it; only
     * the declared type's bytes are copied. */
    pub fn set_record<S: AsRef<[u8]>>(
        &mut self,
        name: &str,
        value: &RecordView<S>,
    ) -> LayoutResult<()> {
        let meta = Arc::clone(&self.meta);
        let (desc, placement) = locate(&meta, self.buf.as_ref(), self.offset, name)?;
        let declared = nested_record(desc, false)?;
        copy_record(
            declared,
            self.buf.as_mut(),
            self.offset + placement.offset,
            value,
        )
    }
}

impl RecordView<Vec<u8>> {
    /* Fresh zeroed instance; counted arrays start empty */
    pub fn alloc(meta: Arc<RecordMetadata>) -> Self {
        let buf = vec![0u8; meta.static_size()];
        Self {
            meta,
            buf,
            offset: 0,
        }
    }

    /* Grows the owned buffer until it covers the current instance size.
     *
     * Call after raising a counter; new elements are zeroed. */
    pub fn fit_buffer(&mut self) -> LayoutResult<usize> {
        loop {
            match size_of_instance(&self.meta, &self.buf, self.offset) {
                Ok(size) => {
                    let end = self.offset + size;
                    if self.buf.len() < end {
                        self.buf.resize(end, 0);
                    }
                    return Ok(size);
                }
                Err(LayoutError::BufferTooSmall {
                    required,
                    available,
                }) if required > available && required != usize::MAX => {
                    self.buf.resize(required, 0);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
