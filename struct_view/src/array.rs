/* Indexable views over array members */

use crate::view::{copy_record, RecordView};
use std::sync::Arc;
use struct_layout::{
    check_bounds, size_of_instance, LayoutError, LayoutResult, Primitive, PrimitiveType,
    RecordMetadata, Scalar,
};

/* Zero-copy view over `len` consecutive primitives */
#[derive(Debug, Clone)]
pub struct ArrayView<B> {
    buf: B,
    offset: usize,
    len: usize,
    element: PrimitiveType,
    little_endian: bool,
}

impl<B: AsRef<[u8]>> ArrayView<B> {
    pub fn new(
        buf: B,
        offset: usize,
        len: usize,
        element: PrimitiveType,
        little_endian: bool,
    ) -> LayoutResult<Self> {
        let byte_len = element
            .byte_width()
            .checked_mul(len)
            .ok_or(LayoutError::BufferTooSmall {
                required: usize::MAX,
                available: buf.as_ref().len(),
            })?;
        check_bounds(buf.as_ref().len(), offset, byte_len)?;
        Ok(Self {
            buf,
            offset,
            len,
            element,
            little_endian,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.element
    }

    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    fn element_offset(&self, index: usize) -> LayoutResult<usize> {
        if index >= self.len {
            return Err(LayoutError::OutOfBounds {
                index,
                length: self.len,
            });
        }
        Ok(self.offset + index * self.element.byte_width())
    }

    pub fn get(&self, index: usize) -> LayoutResult<Scalar> {
        let at = self.element_offset(index)?;
        self.element.read(self.buf.as_ref(), at, self.little_endian)
    }

    pub fn get_as<T: Primitive>(&self, index: usize) -> LayoutResult<T> {
        self.get(index).map(T::from_scalar)
    }

    /* Copies every element out */
    pub fn to_vec(&self) -> LayoutResult<Vec<Scalar>> {
        self.element
            .read_array(self.buf.as_ref(), self.offset, self.len, self.little_endian)
    }

    /* Raw bytes covered by the view */
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.offset + self.len * self.element.byte_width();
        &self.buf.as_ref()[self.offset..end]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ArrayView<B> {
    pub fn set(&mut self, index: usize, value: impl Into<Scalar>) -> LayoutResult<()> {
        let at = self.element_offset(index)?;
        self.element
            .write(self.buf.as_mut(), at, self.little_endian, value.into())
    }

    /* Writes `values` from index 0; fails without writing if they do not fit */
    pub fn copy_from(&mut self, values: &[Scalar]) -> LayoutResult<()> {
        if values.len() > self.len {
            return Err(LayoutError::OutOfBounds {
                index: values.len() - 1,
                length: self.len,
            });
        }
        for (index, value) in values.iter().enumerate() {
            self.set(index, *value)?;
        }
        Ok(())
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let end = self.offset + self.len * self.element.byte_width();
        let offset = self.offset;
        &mut self.buf.as_mut()[offset..end]
    }
}

/* Indexable array of nested records sharing the parent buffer */
#[derive(Debug, Clone)]
pub struct RecordArray<B> {
    element: Arc<RecordMetadata>,
    buf: B,
    offset: usize,
    len: usize,
}

impl<B: AsRef<[u8]>> RecordArray<B> {
    pub(crate) fn new(element: Arc<RecordMetadata>, buf: B, offset: usize, len: usize) -> Self {
        Self {
            element,
            buf,
            offset,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element_type(&self) -> &Arc<RecordMetadata> {
        &self.element
    }

    /* Static elements are strided; dynamic ones are walked from the start */
    fn element_offset(&self, index: usize) -> LayoutResult<usize> {
        if index >= self.len {
            return Err(LayoutError::OutOfBounds {
                index,
                length: self.len,
            });
        }
        if !self.element.is_dynamic() {
            return Ok(self.offset + index * self.element.static_size());
        }
        let mut at = self.offset;
        for _ in 0..index {
            at += size_of_instance(&self.element, self.buf.as_ref(), at)?;
        }
        Ok(at)
    }

    pub fn get(&self, index: usize) -> LayoutResult<RecordView<&[u8]>> {
        let at = self.element_offset(index)?;
        RecordView::at(Arc::clone(&self.element), self.buf.as_ref(), at)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RecordArray<B> {
    pub fn get_mut(&mut self, index: usize) -> LayoutResult<RecordView<&mut [u8]>> {
        let at = self.element_offset(index)?;
        RecordView::at(Arc::clone(&self.element), self.buf.as_mut(), at)
    }

    /* Copies the bytes of `value` into element `index` */
    pub fn set<S: AsRef<[u8]>>(&mut self, index: usize, value: &RecordView<S>) -> LayoutResult<()> {
        let at = self.element_offset(index)?;
        copy_record(&self.element, self.buf.as_mut(), at, value)
    }
}
