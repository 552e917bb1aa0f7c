//! Record metadata and the two-phase builder that produces it.
//!
//! A [`RecordBuilder`] collects member declarations; [`RecordBuilder::finish`]
//! validates them, computes the static layout once and freezes it into an
//! immutable [`RecordMetadata`] shared through `Arc`. A derived record starts
//! from a clone of its base's finalized member list, so the base layout is
//! literally its prefix.

use crate::calc::checked_align;
use crate::errors::{LayoutError, LayoutResult};
use crate::primitive::PrimitiveType;
use indexmap::IndexMap;
use std::sync::Arc;
use struct_types::{MemberLength, RecordOptions};
use tracing::debug;

/// Type of a member: a primitive or a previously finalized record.
#[derive(Debug, Clone)]
pub enum MemberType {
    Primitive(PrimitiveType),
    Record(Arc<RecordMetadata>),
}

impl MemberType {
    pub fn name(&self) -> &str {
        match self {
            MemberType::Primitive(prim) => prim.name(),
            MemberType::Record(meta) => meta.name(),
        }
    }

    /// Size of one element, counting a dynamic record's static part only.
    pub fn static_size(&self) -> usize {
        match self {
            MemberType::Primitive(prim) => prim.byte_width(),
            MemberType::Record(meta) => meta.static_size(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, MemberType::Record(meta) if meta.is_dynamic())
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            MemberType::Primitive(prim) => Some(*prim),
            MemberType::Record(_) => None,
        }
    }

    pub fn record(&self) -> Option<&Arc<RecordMetadata>> {
        match self {
            MemberType::Primitive(_) => None,
            MemberType::Record(meta) => Some(meta),
        }
    }
}

impl From<PrimitiveType> for MemberType {
    fn from(prim: PrimitiveType) -> Self {
        MemberType::Primitive(prim)
    }
}

impl From<Arc<RecordMetadata>> for MemberType {
    fn from(meta: Arc<RecordMetadata>) -> Self {
        MemberType::Record(meta)
    }
}

impl From<&Arc<RecordMetadata>> for MemberType {
    fn from(meta: &Arc<RecordMetadata>) -> Self {
        MemberType::Record(Arc::clone(meta))
    }
}

/// One finalized member slot.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub ty: MemberType,
    pub length: Option<MemberLength>,
    /// Offset computed at declaration time, counting counted-by arrays as empty.
    pub static_offset: usize,
    /// Declared size; 0 for counted-by arrays.
    pub byte_size: usize,
    pub little_endian: bool,
    /// Alignment of the record that declared this member.
    pub alignment: usize,
    /// Whether `static_offset` holds for every instance.
    pub offset_is_static: bool,
    /// Position in the owning record's member list, inherited members first.
    pub index: usize,
    pub(crate) counter_index: Option<usize>,
}

impl MemberDescriptor {
    pub fn is_array(&self) -> bool {
        self.length.is_some()
    }

    pub fn fixed_length(&self) -> Option<usize> {
        match self.length {
            Some(MemberLength::Fixed(n)) => Some(n as usize),
            _ => None,
        }
    }

    /// Name of the counter field for a counted-by array.
    pub fn counter(&self) -> Option<&str> {
        match &self.length {
            Some(MemberLength::CountedBy(counter)) => Some(counter),
            _ => None,
        }
    }

    pub fn counter_index(&self) -> Option<usize> {
        self.counter_index
    }

    /// Whether this member's size depends on instance data.
    pub fn is_dynamic(&self) -> bool {
        self.counter().is_some() || self.ty.is_dynamic()
    }

    /// Element type is `char`, so the member reads naturally as text.
    pub fn is_text(&self) -> bool {
        self.is_array() && self.ty.primitive() == Some(PrimitiveType::Char)
    }
}

/// Immutable layout descriptor of a record type.
#[derive(Debug)]
pub struct RecordMetadata {
    name: String,
    options: RecordOptions,
    base: Option<Arc<RecordMetadata>>,
    members: IndexMap<String, MemberDescriptor>,
    own_start: usize,
    static_size: usize,
    is_dynamic: bool,
}

impl RecordMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    pub fn base(&self) -> Option<&Arc<RecordMetadata>> {
        self.base.as_ref()
    }

    pub fn static_size(&self) -> usize {
        self.static_size
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    pub fn is_union(&self) -> bool {
        self.options.is_union
    }

    pub fn alignment(&self) -> usize {
        self.options.alignment as usize
    }

    pub fn little_endian(&self) -> bool {
        !self.options.big_endian
    }

    /// All members in layout order, inherited ones first.
    pub fn members(&self) -> impl ExactSizeIterator<Item = &MemberDescriptor> {
        self.members.values()
    }

    /// Members declared by this record itself.
    pub fn own_members(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.values().skip(self.own_start)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn get_member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.get(name)
    }

    pub fn member(&self, name: &str) -> LayoutResult<&MemberDescriptor> {
        self.get_member(name)
            .ok_or_else(|| LayoutError::missing_member(&self.name, name))
    }

    pub fn member_at(&self, index: usize) -> Option<&MemberDescriptor> {
        self.members.get_index(index).map(|(_, desc)| desc)
    }

    /// True if `self` is `other` or extends it, directly or transitively.
    ///
    /// Records are compared by identity: two separately built records with
    /// the same name are unrelated.
    pub fn is_a(&self, other: &RecordMetadata) -> bool {
        let mut current = Some(self);
        while let Some(meta) = current {
            if std::ptr::eq(meta, other) {
                return true;
            }
            current = meta.base.as_deref();
        }
        false
    }
}

/// Collects member declarations for one record type.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: String,
    options: RecordOptions,
    base: Option<Arc<RecordMetadata>>,
    decls: Vec<(String, MemberType, Option<MemberLength>)>,
}

impl RecordBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: RecordOptions::default(),
            base: None,
            decls: Vec::new(),
        }
    }

    pub fn options(mut self, options: RecordOptions) -> Self {
        self.options = options;
        self
    }

    pub fn aligned(mut self, alignment: u64) -> Self {
        self.options.alignment = alignment;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.options.big_endian = true;
        self
    }

    pub fn union(mut self) -> Self {
        self.options.is_union = true;
        self
    }

    pub fn extends(mut self, base: &Arc<RecordMetadata>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    pub fn member(
        mut self,
        name: impl Into<String>,
        ty: impl Into<MemberType>,
        length: Option<MemberLength>,
    ) -> Self {
        self.decls.push((name.into(), ty.into(), length));
        self
    }

    pub fn field(self, name: impl Into<String>, ty: impl Into<MemberType>) -> Self {
        self.member(name, ty, None)
    }

    pub fn array(self, name: impl Into<String>, ty: impl Into<MemberType>, length: usize) -> Self {
        self.member(name, ty, Some(MemberLength::Fixed(length as u64)))
    }

    pub fn counted_by(
        self,
        name: impl Into<String>,
        ty: impl Into<MemberType>,
        counter: impl Into<String>,
    ) -> Self {
        self.member(name, ty, Some(MemberLength::CountedBy(counter.into())))
    }

    /// Validates the declarations and freezes the layout.
    pub fn finish(self) -> LayoutResult<Arc<RecordMetadata>> {
        let RecordBuilder {
            name,
            options,
            base,
            decls,
        } = self;

        if options.alignment == 0 {
            return Err(LayoutError::InvalidAlignment {
                record: name,
                alignment: options.alignment,
            });
        }
        let alignment = options.alignment as usize;
        let little_endian = !options.big_endian;

        let (mut members, mut offset, mut is_dynamic) = match &base {
            Some(base) => (base.members.clone(), base.static_size, base.is_dynamic),
            None => (IndexMap::new(), 0, false),
        };
        let own_start = members.len();
        let union_start = offset;
        let base_dynamic = is_dynamic;

        for (member_name, ty, length) in decls {
            if members.contains_key(&member_name) {
                return Err(LayoutError::DuplicateMemberName {
                    record: name,
                    member: member_name,
                });
            }

            let counter_index = match &length {
                Some(MemberLength::CountedBy(counter)) => {
                    Some(validate_counter(&members, &name, &member_name, counter)?)
                }
                _ => None,
            };

            let too_large = || LayoutError::LayoutTooLarge {
                record: name.clone(),
                member: member_name.clone(),
            };
            let element_size = ty.static_size();
            let byte_size = match &length {
                None => element_size,
                Some(MemberLength::Fixed(n)) => usize::try_from(*n)
                    .ok()
                    .and_then(|n| element_size.checked_mul(n))
                    .ok_or_else(too_large)?,
                Some(MemberLength::CountedBy(_)) => 0,
            };
            let member_dynamic = counter_index.is_some() || ty.is_dynamic();

            let (static_offset, offset_is_static) = if options.is_union {
                (union_start, !base_dynamic)
            } else {
                (offset, !is_dynamic)
            };

            offset = if options.is_union {
                union_start.checked_add(byte_size).map(|end| offset.max(end))
            } else {
                offset.checked_add(byte_size)
            }
            .and_then(|end| checked_align(end, alignment))
            .ok_or_else(too_large)?;
            is_dynamic |= member_dynamic;

            let index = members.len();
            members.insert(
                member_name.clone(),
                MemberDescriptor {
                    name: member_name,
                    ty,
                    length,
                    static_offset,
                    byte_size,
                    little_endian,
                    alignment,
                    offset_is_static,
                    index,
                    counter_index,
                },
            );
        }

        let last = members.len().saturating_sub(1);
        if let Some(desc) = members
            .values()
            .find(|desc| desc.ty.is_dynamic() && desc.index != last)
        {
            return Err(LayoutError::DynamicMemberNotLast {
                record: name,
                member: desc.name.clone(),
            });
        }

        debug!(
            record = %name,
            size = offset,
            dynamic = is_dynamic,
            union = options.is_union,
            members = members.len(),
            "record layout finalized"
        );

        Ok(Arc::new(RecordMetadata {
            name,
            options,
            base,
            members,
            own_start,
            static_size: offset,
            is_dynamic,
        }))
    }
}

fn validate_counter(
    members: &IndexMap<String, MemberDescriptor>,
    record: &str,
    member: &str,
    counter: &str,
) -> LayoutResult<usize> {
    let invalid = |reason| LayoutError::InvalidCountField {
        record: record.to_string(),
        member: member.to_string(),
        counter: counter.to_string(),
        reason,
    };

    let desc = members
        .get(counter)
        .ok_or_else(|| invalid("counter must be declared before the array"))?;
    match desc.ty.primitive() {
        Some(prim) if prim.is_integer() => {}
        _ => return Err(invalid("counter must be an integer field")),
    }
    if desc.is_array() {
        return Err(invalid("counter must be a scalar field"));
    }
    Ok(desc.index)
}

/// One-shot form of [`RecordBuilder`].
pub fn declare_record(
    name: impl Into<String>,
    base: Option<&Arc<RecordMetadata>>,
    members: impl IntoIterator<Item = (String, MemberType, Option<MemberLength>)>,
    options: RecordOptions,
) -> LayoutResult<Arc<RecordMetadata>> {
    let mut builder = RecordBuilder::new(name).options(options);
    if let Some(base) = base {
        builder = builder.extends(base);
    }
    for (member_name, ty, length) in members {
        builder = builder.member(member_name, ty, length);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveType::*;

    fn header() -> Arc<RecordMetadata> {
        RecordBuilder::new("Header")
            .array("magic", Char, 4)
            .field("count", Uint16)
            .array("end", Char, 4)
            .finish()
            .expect("header")
    }

    #[test]
    fn packed_layout_is_additive() {
        let meta = header();
        assert_eq!(meta.static_size(), 10);
        assert!(!meta.is_dynamic());

        let offsets: Vec<usize> = meta.members().map(|m| m.static_offset).collect();
        assert_eq!(offsets, vec![0, 4, 6]);
        let total: usize = meta.members().map(|m| m.byte_size).sum();
        assert_eq!(total, meta.static_size());
    }

    #[test]
    fn alignment_pads_after_each_member() {
        let meta = RecordBuilder::new("Padded")
            .aligned(4)
            .field("a", Uint8)
            .field("b", Uint16)
            .field("c", Uint32)
            .finish()
            .unwrap();
        let offsets: Vec<usize> = meta.members().map(|m| m.static_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(meta.static_size(), 12);
    }

    #[test]
    fn union_members_share_offset_zero() {
        let meta = RecordBuilder::new("Word")
            .union()
            .field("a", Uint32)
            .array("b", Uint8, 4)
            .field("c", Uint16)
            .finish()
            .unwrap();
        assert!(meta.is_union());
        assert_eq!(meta.static_size(), 4);
        assert!(meta.members().all(|m| m.static_offset == 0));
    }

    #[test]
    fn derived_record_prepends_base() {
        let base = RecordBuilder::new("Base")
            .field("a", Uint32)
            .field("b", Uint8)
            .finish()
            .unwrap();
        let derived = RecordBuilder::new("Derived")
            .extends(&base)
            .aligned(8)
            .field("c", Uint16)
            .finish()
            .unwrap();

        assert_eq!(derived.member("a").unwrap().static_offset, 0);
        assert_eq!(derived.member("b").unwrap().static_offset, 4);
        assert_eq!(derived.member("c").unwrap().static_offset, base.static_size());
        assert_eq!(derived.static_size(), 8);
        assert_eq!(derived.own_members().count(), 1);
        assert!(derived.is_a(&base));
        assert!(!base.is_a(&derived));

        let namesake = RecordBuilder::new("Base")
            .field("a", Uint32)
            .field("b", Uint8)
            .finish()
            .unwrap();
        assert!(!namesake.is_a(&base));
        assert!(!derived.is_a(&namesake));
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let huge = RecordBuilder::new("Huge")
            .array("a", Uint16, usize::MAX)
            .finish();
        assert!(matches!(huge, Err(LayoutError::LayoutTooLarge { .. })));

        let sum = RecordBuilder::new("Sum")
            .array("a", Uint8, usize::MAX)
            .field("b", Uint8)
            .finish();
        assert_eq!(
            sum.err(),
            Some(LayoutError::LayoutTooLarge {
                record: "Sum".to_string(),
                member: "b".to_string()
            })
        );
    }

    #[test]
    fn counted_by_marks_record_dynamic() {
        let meta = RecordBuilder::new("Packet")
            .field("len", Uint8)
            .counted_by("data", Uint16, "len")
            .field("crc", Uint32)
            .finish()
            .unwrap();
        assert!(meta.is_dynamic());
        assert_eq!(meta.static_size(), 5);

        let data = meta.member("data").unwrap();
        assert_eq!(data.byte_size, 0);
        assert_eq!(data.counter(), Some("len"));
        assert_eq!(data.counter_index(), Some(0));
        assert!(data.offset_is_static);
        assert!(!meta.member("crc").unwrap().offset_is_static);
    }

    #[test]
    fn counter_must_precede_and_be_integer() {
        let late = RecordBuilder::new("Late")
            .counted_by("data", Uint8, "len")
            .field("len", Uint8)
            .finish();
        assert!(matches!(late, Err(LayoutError::InvalidCountField { .. })));

        let float = RecordBuilder::new("Float")
            .field("len", Float32)
            .counted_by("data", Uint8, "len")
            .finish();
        assert!(matches!(float, Err(LayoutError::InvalidCountField { .. })));

        let array = RecordBuilder::new("Array")
            .array("len", Uint8, 2)
            .counted_by("data", Uint8, "len")
            .finish();
        assert!(matches!(array, Err(LayoutError::InvalidCountField { .. })));
    }

    #[test]
    fn inherited_counter_is_accepted() {
        let base = RecordBuilder::new("Base").field("n", Uint32).finish().unwrap();
        let derived = RecordBuilder::new("Derived")
            .extends(&base)
            .counted_by("items", Int64, "n")
            .finish()
            .unwrap();
        assert!(derived.is_dynamic());
        assert_eq!(derived.member("items").unwrap().static_offset, 4);
    }

    #[test]
    fn rejects_duplicates_and_bad_alignment() {
        let dup = RecordBuilder::new("Dup")
            .field("a", Uint8)
            .field("a", Uint16)
            .finish();
        assert_eq!(
            dup.unwrap_err(),
            LayoutError::DuplicateMemberName {
                record: "Dup".to_string(),
                member: "a".to_string()
            }
        );

        let base = RecordBuilder::new("Base").field("a", Uint8).finish().unwrap();
        let shadow = RecordBuilder::new("Shadow")
            .extends(&base)
            .field("a", Uint8)
            .finish();
        assert!(matches!(shadow, Err(LayoutError::DuplicateMemberName { .. })));

        let zero = RecordBuilder::new("Zero").aligned(0).finish();
        assert!(matches!(zero, Err(LayoutError::InvalidAlignment { .. })));
    }

    #[test]
    fn dynamic_record_member_must_be_last() {
        let dynamic = RecordBuilder::new("Blob")
            .field("len", Uint8)
            .counted_by("bytes", Uint8, "len")
            .finish()
            .unwrap();

        let ok = RecordBuilder::new("Outer")
            .field("tag", Uint8)
            .field("blob", &dynamic)
            .finish()
            .unwrap();
        assert!(ok.is_dynamic());
        assert_eq!(ok.static_size(), 2);

        let bad = RecordBuilder::new("Bad")
            .field("blob", &dynamic)
            .field("tag", Uint8)
            .finish();
        assert!(matches!(bad, Err(LayoutError::DynamicMemberNotLast { .. })));
    }

    #[test]
    fn big_endian_option_flows_to_members() {
        let meta = RecordBuilder::new("Be")
            .big_endian()
            .field("a", Uint32)
            .finish()
            .unwrap();
        assert!(!meta.member("a").unwrap().little_endian);

        let derived = RecordBuilder::new("Le")
            .extends(&meta)
            .field("b", Uint32)
            .finish()
            .unwrap();
        assert!(!derived.member("a").unwrap().little_endian);
        assert!(derived.member("b").unwrap().little_endian);
    }

    #[test]
    fn declare_record_matches_builder() {
        let meta = declare_record(
            "Pair",
            None,
            vec![
                ("x".to_string(), MemberType::from(Int16), None),
                ("y".to_string(), MemberType::from(Int16), Some(MemberLength::Fixed(3))),
            ],
            RecordOptions::default(),
        )
        .unwrap();
        assert_eq!(meta.static_size(), 8);
        assert_eq!(meta.member("y").unwrap().fixed_length(), Some(3));
        assert!(matches!(
            meta.member("z"),
            Err(LayoutError::MissingMember { .. })
        ));
    }
}
