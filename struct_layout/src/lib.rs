//! Struct Layout Engine
//!
//! Declares record types and computes their C-compatible byte layout:
//! member offsets, alignment padding, union overlays, inherited prefixes
//! and counted-by arrays whose length is read from an earlier field.

pub mod calc;
pub mod errors;
pub mod primitive;
pub mod record;
pub mod registry;
pub mod report;

pub use calc::{
    align, checked_align, length_of, offset_of, offset_of_instance, size_of, size_of_instance, size_of_member,
    Placement, RuntimeLayout,
};
pub use errors::{check_bounds, LayoutError, LayoutResult};
pub use primitive::{Primitive, PrimitiveType, Scalar};
pub use record::{declare_record, MemberDescriptor, MemberType, RecordBuilder, RecordMetadata};
pub use registry::TypeRegistry;
pub use report::{LayoutReport, MemberReport};
pub use struct_types::{LayoutFile, MemberDecl, MemberLength, RecordDecl, RecordOptions};
