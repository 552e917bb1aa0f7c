/* Serialization between record values and flat byte buffers
 *
 * Both directions follow the same layout rules as the zero-copy views: base
 * members first, alignment rounding after each member, union members at a
 * shared start and counted-by lengths taken from the counter field. A value
 * carrying a custom codec is handed to it unconditionally.
 */

use crate::value::{check_record_type, RecordValue, Value};
use std::sync::Arc;
use struct_layout::{
    check_bounds, checked_align, size_of_instance, LayoutError, LayoutResult, MemberDescriptor,
    MemberLength, MemberType, PrimitiveType, RecordMetadata, RuntimeLayout, Scalar,
};
use tracing::trace;

/* Encodes `value` into a freshly allocated buffer */
pub fn serialize(value: &RecordValue) -> LayoutResult<Vec<u8>> {
    if let Some(codec) = value.custom_codec() {
        trace!(record = %value.metadata().name(), "serializing with custom codec");
        return codec.encode(value);
    }
    let mut out = Vec::with_capacity(value.metadata().static_size());
    let meta = Arc::clone(value.metadata());
    write_members(value, &meta, &mut out, 0)?;
    Ok(out)
}

/* Number of bytes `serialize` would produce */
pub fn size_of_value(value: &RecordValue) -> LayoutResult<usize> {
    serialize(value).map(|bytes| bytes.len())
}

/* Populates `value` from `bytes`.
 *
 * Nested record values already present are filled in place; empty ones are
 * created from the declared member type. */
pub fn deserialize(value: &mut RecordValue, bytes: &[u8]) -> LayoutResult<()> {
    if let Some(codec) = value.custom_codec().cloned() {
        trace!(record = %value.metadata().name(), "deserializing with custom codec");
        return codec.decode(value, bytes);
    }
    let meta = Arc::clone(value.metadata());
    check_bounds(bytes.len(), 0, meta.static_size())?;
    read_members(value, &meta, bytes, 0).map(|_| ())
}

fn too_large(member: &str, count: usize) -> LayoutError {
    LayoutError::invalid_value(member, format!("{count} elements do not fit in memory"))
}

/* Zero-extends `out` to cover `len` bytes at `at` */
fn ensure_len(out: &mut Vec<u8>, at: usize, len: usize, member: &str) -> LayoutResult<()> {
    let end = at.checked_add(len).ok_or_else(|| too_large(member, len))?;
    if out.len() < end {
        out.try_reserve(end - out.len())
            .map_err(|_| too_large(member, len))?;
        out.resize(end, 0);
    }
    Ok(())
}

/* Byte size of `count` elements of `elem_size` bytes */
fn extent(elem_size: usize, count: usize, member: &str) -> LayoutResult<usize> {
    elem_size
        .checked_mul(count)
        .ok_or_else(|| too_large(member, count))
}

/* Element count to write for `desc`, taken from the value being written */
fn element_count(value: &RecordValue, desc: &MemberDescriptor) -> LayoutResult<usize> {
    match &desc.length {
        None => Ok(1),
        Some(MemberLength::Fixed(n)) => Ok(*n as usize),
        Some(MemberLength::CountedBy(counter)) => match value.get(counter) {
            Some(_) => value.scalar(counter).map(Scalar::as_count),
            None if value.get(&desc.name).is_none() => Ok(0),
            None => Err(LayoutError::missing_member(value.metadata().name(), counter.as_str())),
        },
    }
}

fn write_members(
    value: &RecordValue,
    meta: &RecordMetadata,
    out: &mut Vec<u8>,
    start: usize,
) -> LayoutResult<usize> {
    let mut cursor = match meta.base() {
        Some(base) => write_members(value, base, out, start)?,
        None => 0,
    };
    let union_start = cursor;

    for desc in meta.own_members() {
        let offset = if meta.is_union() { union_start } else { cursor };
        let count = element_count(value, desc)?;
        let at = start
            .checked_add(offset)
            .ok_or_else(|| too_large(&desc.name, count))?;
        let size = match value.get(&desc.name) {
            Some(field) => write_member(desc, field, count, out, at)?,
            None => extent(desc.ty.static_size(), count, &desc.name)?,
        };
        trace!(record = %meta.name(), member = %desc.name, offset, size, "wrote member");
        ensure_len(out, at, size, &desc.name)?;

        cursor = if meta.is_union() {
            union_start.checked_add(size).map(|end| cursor.max(end))
        } else {
            cursor.checked_add(size)
        }
        .and_then(|end| checked_align(end, desc.alignment))
        .ok_or_else(|| too_large(&desc.name, count))?;
    }
    ensure_len(out, start, cursor, meta.name())?;
    Ok(cursor)
}

fn write_member(
    desc: &MemberDescriptor,
    field: &Value,
    count: usize,
    out: &mut Vec<u8>,
    at: usize,
) -> LayoutResult<usize> {
    let shape_error = |expected: &str| {
        LayoutError::invalid_value(
            &desc.name,
            format!("expected {expected}, found {}", field.kind()),
        )
    };

    match (&desc.ty, desc.is_array()) {
        (MemberType::Primitive(prim), false) => {
            let scalar = field.as_scalar().ok_or_else(|| shape_error("a scalar"))?;
            ensure_len(out, at, prim.byte_width(), &desc.name)?;
            prim.write(out, at, desc.little_endian, scalar)?;
            Ok(prim.byte_width())
        }
        (MemberType::Primitive(prim), true) => {
            let elements = primitive_elements(*prim, field).ok_or_else(|| shape_error("an array"))?;
            check_count(desc, elements.len(), count)?;
            let width = prim.byte_width();
            let size = extent(width, count, &desc.name)?;
            ensure_len(out, at, size, &desc.name)?;
            for (index, scalar) in elements.into_iter().take(count).enumerate() {
                prim.write(out, at + index * width, desc.little_endian, scalar)?;
            }
            Ok(size)
        }
        (MemberType::Record(declared), false) => {
            let record = field.as_record().ok_or_else(|| shape_error("a record"))?;
            write_nested(record, declared, out, at)
        }
        (MemberType::Record(declared), true) => {
            let items = field.as_array().ok_or_else(|| shape_error("an array"))?;
            check_count(desc, items.len(), count)?;
            let mut size = 0;
            for item in items.iter().take(count) {
                let record = item
                    .as_record()
                    .ok_or_else(|| shape_error("record elements"))?;
                size += write_nested(record, declared, out, at + size)?;
            }
            let missing = count.saturating_sub(items.len());
            size = extent(declared.static_size(), missing, &desc.name)?
                .checked_add(size)
                .ok_or_else(|| too_large(&desc.name, count))?;
            ensure_len(out, at, size, &desc.name)?;
            Ok(size)
        }
    }
}

/* Fixed arrays may be short (zero-filled); counted arrays must supply every element */
fn check_count(desc: &MemberDescriptor, supplied: usize, count: usize) -> LayoutResult<()> {
    match &desc.length {
        Some(MemberLength::Fixed(_)) if supplied > count => Err(LayoutError::invalid_value(
            &desc.name,
            format!("{supplied} elements exceed the fixed length {count}"),
        )),
        Some(MemberLength::CountedBy(counter)) if supplied < count => {
            Err(LayoutError::invalid_value(
                &desc.name,
                format!("'{counter}' is {count} but only {supplied} elements are present"),
            ))
        }
        _ => Ok(()),
    }
}

fn primitive_elements(prim: PrimitiveType, field: &Value) -> Option<Vec<Scalar>> {
    match field {
        Value::Text(text) if prim.byte_width() == 1 => {
            Some(text.bytes().map(Scalar::from).collect())
        }
        Value::Array(items) => items.iter().map(Value::as_scalar).collect(),
        _ => None,
    }
}

/* Writes `record` with the layout of its declared member type */
fn write_nested(
    record: &RecordValue,
    declared: &Arc<RecordMetadata>,
    out: &mut Vec<u8>,
    at: usize,
) -> LayoutResult<usize> {
    check_record_type(declared, record)?;
    let Some(codec) = record.custom_codec() else {
        return write_members(record, declared, out, at);
    };

    let bytes = codec.encode(record)?;
    if !declared.is_dynamic() && bytes.len() != declared.static_size() {
        return Err(LayoutError::invalid_value(
            declared.name(),
            format!(
                "custom codec produced {} bytes for a {}-byte record",
                bytes.len(),
                declared.static_size()
            ),
        ));
    }
    ensure_len(out, at, bytes.len(), declared.name())?;
    out[at..at + bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

fn read_members(
    value: &mut RecordValue,
    meta: &RecordMetadata,
    bytes: &[u8],
    start: usize,
) -> LayoutResult<usize> {
    let layout = RuntimeLayout::resolve(meta, bytes, start)?;

    for desc in meta.members() {
        let placement = layout.placement(desc);
        let at = start + placement.offset;
        check_bounds(bytes.len(), at, placement.size)?;
        trace!(
            record = %meta.name(),
            member = %desc.name,
            offset = placement.offset,
            length = placement.length,
            "reading member"
        );

        match (&desc.ty, desc.is_array()) {
            (MemberType::Primitive(prim), false) => {
                let scalar = prim.read(bytes, at, desc.little_endian)?;
                value.set(&desc.name, scalar)?;
            }
            (MemberType::Primitive(prim), true) => {
                let items: Vec<Value> = prim
                    .read_array(bytes, at, placement.length, desc.little_endian)?
                    .into_iter()
                    .map(Value::Scalar)
                    .collect();
                value.set(&desc.name, items)?;
            }
            (MemberType::Record(declared), false) => {
                match value.get_mut(&desc.name).and_then(Value::as_record_mut) {
                    Some(existing) => {
                        read_nested(existing, declared, bytes, at, placement.size)?;
                    }
                    None => {
                        let mut fresh = RecordValue::new(Arc::clone(declared));
                        read_nested(&mut fresh, declared, bytes, at, placement.size)?;
                        value.set(&desc.name, fresh)?;
                    }
                }
            }
            (MemberType::Record(declared), true) => {
                let mut existing = match value.remove(&desc.name) {
                    Some(Value::Array(items)) => items.into_iter(),
                    _ => Vec::new().into_iter(),
                };
                let mut items = Vec::with_capacity(placement.length);
                let mut cursor = at;
                for _ in 0..placement.length {
                    let mut element = match existing.next() {
                        Some(Value::Record(record)) => record,
                        _ => RecordValue::new(Arc::clone(declared)),
                    };
                    let size = size_of_instance(declared, bytes, cursor)?;
                    read_nested(&mut element, declared, bytes, cursor, size)?;
                    items.push(Value::Record(element));
                    cursor += size;
                }
                value.set(&desc.name, items)?;
            }
        }
    }
    Ok(layout.size())
}

fn read_nested(
    record: &mut RecordValue,
    declared: &RecordMetadata,
    bytes: &[u8],
    at: usize,
    size: usize,
) -> LayoutResult<()> {
    match record.custom_codec().cloned() {
        Some(codec) => codec.decode(record, &bytes[at..at + size]),
        None => read_members(record, declared, bytes, at).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use struct_layout::PrimitiveType::*;
    use struct_layout::RecordBuilder;

    #[test]
    fn absent_members_are_zero_filled() {
        let meta = RecordBuilder::new("Pair")
            .aligned(4)
            .field("a", Uint8)
            .field("b", Uint16)
            .finish()
            .unwrap();
        let mut value = RecordValue::new(meta);
        value.set("b", 0x0102u16).unwrap();
        assert_eq!(serialize(&value).unwrap(), vec![0, 0, 0, 0, 2, 1, 0, 0]);
    }

    #[test]
    fn counted_arrays_need_every_element() {
        let meta = RecordBuilder::new("Packet")
            .field("len", Uint8)
            .counted_by("data", Uint8, "len")
            .finish()
            .unwrap();

        let mut short = RecordValue::new(Arc::clone(&meta));
        short.set("len", 3u8).unwrap();
        short.set("data", vec![Value::from(1u8)]).unwrap();
        assert!(matches!(
            serialize(&short),
            Err(LayoutError::InvalidValue { .. })
        ));

        let mut headless = RecordValue::new(Arc::clone(&meta));
        headless.set("data", vec![Value::from(1u8)]).unwrap();
        assert!(matches!(
            serialize(&headless),
            Err(LayoutError::MissingMember { .. })
        ));

        let mut empty = RecordValue::new(meta);
        empty.set("len", 2u8).unwrap();
        assert_eq!(serialize(&empty).unwrap(), vec![2, 0, 0]);
        assert_eq!(size_of_value(&empty).unwrap(), 3);
    }

    #[test]
    fn huge_counters_are_refused_without_allocating() {
        let meta = RecordBuilder::new("Huge")
            .field("len", Uint64)
            .counted_by("data", Uint32, "len")
            .finish()
            .unwrap();
        let mut value = RecordValue::new(Arc::clone(&meta));
        value.set("len", u64::MAX).unwrap();
        assert!(matches!(
            serialize(&value),
            Err(LayoutError::InvalidValue { .. })
        ));

        /* Fits in usize but not in an allocation */
        let mut wide = RecordValue::new(meta);
        wide.set("len", (isize::MAX as u64) / 4).unwrap();
        assert!(matches!(
            serialize(&wide),
            Err(LayoutError::InvalidValue { .. })
        ));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let meta = RecordBuilder::new("Word").field("w", Uint32).finish().unwrap();
        let mut value = RecordValue::new(meta);
        assert_eq!(
            deserialize(&mut value, &[1, 2]),
            Err(LayoutError::BufferTooSmall {
                required: 4,
                available: 2
            })
        );
    }
}
