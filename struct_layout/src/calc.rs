//! Layout calculator: `align`, `size_of` and `offset_of`.
//!
//! The static forms only need metadata. The instance forms take the bytes a
//! record is bound to and walk its members, reading counter fields where a
//! counted-by array makes the layout depend on data. Nothing is cached:
//! any counter may change between two calls.

use crate::errors::{LayoutError, LayoutResult};
use crate::record::{MemberDescriptor, MemberType, RecordMetadata};
use struct_types::MemberLength;

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Overflow-checked [`align`].
pub fn checked_align(value: usize, alignment: usize) -> Option<usize> {
    if alignment <= 1 {
        return Some(value);
    }
    value.div_ceil(alignment).checked_mul(alignment)
}

/// Size of one value of `ty`; dynamic records have no static size.
pub fn size_of(ty: &MemberType) -> LayoutResult<usize> {
    match ty {
        MemberType::Primitive(prim) => Ok(prim.byte_width()),
        MemberType::Record(meta) if meta.is_dynamic() => Err(LayoutError::DynamicSize {
            name: meta.name().to_string(),
        }),
        MemberType::Record(meta) => Ok(meta.static_size()),
    }
}

/// Static size of a member including its fixed element count.
pub fn size_of_member(desc: &MemberDescriptor) -> LayoutResult<usize> {
    if desc.is_dynamic() {
        return Err(LayoutError::DynamicSize {
            name: desc.name.clone(),
        });
    }
    Ok(desc.byte_size)
}

/// Static offset of `member` within `meta`.
pub fn offset_of(meta: &RecordMetadata, member: &str) -> LayoutResult<usize> {
    let desc = meta.member(member)?;
    if !desc.offset_is_static {
        return Err(LayoutError::DynamicSize {
            name: format!("{}.{}", meta.name(), member),
        });
    }
    Ok(desc.static_offset)
}

/// Where one member sits inside a bound instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Offset relative to the start of the record.
    pub offset: usize,
    pub size: usize,
    /// Element count; 1 for scalar members.
    pub length: usize,
}

/// Member placements of one record instance, resolved from its bytes.
#[derive(Debug, Clone)]
pub struct RuntimeLayout {
    placements: Vec<Placement>,
    size: usize,
}

impl RuntimeLayout {
    /// Resolves the layout of the `meta` instance starting at `buf[start..]`.
    pub fn resolve(meta: &RecordMetadata, buf: &[u8], start: usize) -> LayoutResult<Self> {
        let mut placements = Vec::with_capacity(meta.member_count());
        let size = resolve_into(meta, buf, start, &mut placements)?;
        Ok(Self { placements, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn placement(&self, desc: &MemberDescriptor) -> Placement {
        self.placements[desc.index]
    }
}

fn resolve_into(
    meta: &RecordMetadata,
    buf: &[u8],
    start: usize,
    out: &mut Vec<Placement>,
) -> LayoutResult<usize> {
    let mut cursor = match meta.base() {
        Some(base) => resolve_into(base, buf, start, out)?,
        None => 0,
    };
    let union_start = cursor;

    for desc in meta.own_members() {
        let offset = if meta.is_union() { union_start } else { cursor };
        let length = match &desc.length {
            None => 1,
            Some(MemberLength::Fixed(n)) => *n as usize,
            Some(MemberLength::CountedBy(_)) => {
                let counter_index = desc.counter_index().unwrap_or_default();
                read_count(meta, counter_index, out[counter_index].offset, buf, start)?
            }
        };
        let size = member_extent(desc, length, buf, start + offset)?;
        out.push(Placement {
            offset,
            size,
            length,
        });

        cursor = if meta.is_union() {
            union_start.checked_add(size).map(|end| cursor.max(end))
        } else {
            cursor.checked_add(size)
        }
        .and_then(|end| checked_align(end, desc.alignment))
        .ok_or(LayoutError::BufferTooSmall {
            required: usize::MAX,
            available: buf.len(),
        })?;
    }
    Ok(cursor)
}

fn read_count(
    meta: &RecordMetadata,
    counter_index: usize,
    counter_offset: usize,
    buf: &[u8],
    start: usize,
) -> LayoutResult<usize> {
    let counter = meta
        .member_at(counter_index)
        .ok_or_else(|| LayoutError::missing_member(meta.name(), counter_index.to_string()))?;
    let prim = counter
        .ty
        .primitive()
        .ok_or_else(|| LayoutError::invalid_type(counter.ty.name()))?;
    Ok(prim
        .read(buf, start + counter_offset, counter.little_endian)?
        .as_count())
}

/// Bytes occupied by `length` elements of the member starting at `at`.
fn member_extent(
    desc: &MemberDescriptor,
    length: usize,
    buf: &[u8],
    at: usize,
) -> LayoutResult<usize> {
    let too_large = || LayoutError::BufferTooSmall {
        required: usize::MAX,
        available: buf.len(),
    };
    match &desc.ty {
        MemberType::Primitive(prim) => prim.byte_width().checked_mul(length).ok_or_else(too_large),
        MemberType::Record(meta) if !meta.is_dynamic() => {
            meta.static_size().checked_mul(length).ok_or_else(too_large)
        }
        MemberType::Record(meta) => {
            let mut total = 0usize;
            for _ in 0..length {
                let size = size_of_instance(meta, buf, at + total)?;
                total = total.checked_add(size).ok_or_else(too_large)?;
            }
            Ok(total)
        }
    }
}

/// Actual size of the instance of `meta` bound at `buf[start..]`.
pub fn size_of_instance(meta: &RecordMetadata, buf: &[u8], start: usize) -> LayoutResult<usize> {
    if !meta.is_dynamic() {
        return Ok(meta.static_size());
    }
    RuntimeLayout::resolve(meta, buf, start).map(|layout| layout.size())
}

/// Offset of `member` within the instance of `meta` bound at `buf[start..]`.
pub fn offset_of_instance(
    meta: &RecordMetadata,
    member: &str,
    buf: &[u8],
    start: usize,
) -> LayoutResult<usize> {
    let desc = meta.member(member)?;
    if desc.offset_is_static {
        return Ok(desc.static_offset);
    }
    RuntimeLayout::resolve(meta, buf, start).map(|layout| layout.placement(desc).offset)
}

/// Current element count of `desc` for the instance bound at `buf[start..]`.
pub fn length_of(
    meta: &RecordMetadata,
    desc: &MemberDescriptor,
    buf: &[u8],
    start: usize,
) -> LayoutResult<usize> {
    match &desc.length {
        None => Ok(1),
        Some(MemberLength::Fixed(n)) => Ok(*n as usize),
        Some(MemberLength::CountedBy(counter)) => {
            let counter_index = desc.counter_index().unwrap_or_default();
            let counter_offset = offset_of_instance(meta, counter, buf, start)?;
            read_count(meta, counter_index, counter_offset, buf, start)
        }
    }
}
