/* Serializable layout descriptions for tooling output */

use crate::record::{MemberDescriptor, MemberType, RecordMetadata};
use serde_derive::Serialize;
use std::fmt;
use struct_types::MemberLength;

/* Layout of one record type */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayoutReport {
    pub name: String,

    /* Static size; the minimum size when the record is dynamic */
    pub size: usize,

    pub dynamic: bool,
    pub union: bool,
    pub alignment: usize,
    pub big_endian: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    pub members: Vec<MemberReport>,
}

/* Layout of one member */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemberReport {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    /* "primitive" or "record" */
    pub kind: &'static str,

    /* None when the offset depends on instance data */
    pub offset: Option<usize>,

    /* None for counted-by arrays */
    pub size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<MemberLength>,
}

impl LayoutReport {
    pub fn from_metadata(meta: &RecordMetadata) -> Self {
        Self {
            name: meta.name().to_string(),
            size: meta.static_size(),
            dynamic: meta.is_dynamic(),
            union: meta.is_union(),
            alignment: meta.alignment(),
            big_endian: !meta.little_endian(),
            extends: meta.base().map(|base| base.name().to_string()),
            comment: meta.options().comment.clone(),
            members: meta.members().map(MemberReport::from_descriptor).collect(),
        }
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

impl MemberReport {
    fn from_descriptor(desc: &MemberDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            type_name: desc.ty.name().to_string(),
            kind: match desc.ty {
                MemberType::Primitive(_) => "primitive",
                MemberType::Record(_) => "record",
            },
            offset: desc.offset_is_static.then_some(desc.static_offset),
            size: (!desc.is_dynamic()).then_some(desc.byte_size),
            length: desc.length.clone(),
        }
    }
}

impl fmt::Display for LayoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = if self.dynamic {
            format!("{}+ bytes (dynamic)", self.size)
        } else {
            format!("{} bytes", self.size)
        };
        write!(f, "{} {}", if self.union { "union" } else { "struct" }, self.name)?;
        if let Some(base) = &self.extends {
            write!(f, " : {base}")?;
        }
        writeln!(
            f,
            " ({size}, align {}, {})",
            self.alignment,
            if self.big_endian { "big-endian" } else { "little-endian" }
        )?;

        for member in &self.members {
            let offset = member
                .offset
                .map_or_else(|| "?".to_string(), |offset| offset.to_string());
            let size = member
                .size
                .map_or_else(|| "?".to_string(), |size| size.to_string());
            let length = match &member.length {
                None => String::new(),
                Some(MemberLength::Fixed(n)) => format!("[{n}]"),
                Some(MemberLength::CountedBy(counter)) => format!("[{counter}]"),
            };
            writeln!(
                f,
                "  {offset:>6}  {size:>6}  {}: {}{length}",
                member.name, member.type_name
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveType;
    use crate::record::RecordBuilder;

    #[test]
    fn reports_offsets_and_dynamic_members() {
        let meta = RecordBuilder::new("Packet")
            .field("len", PrimitiveType::Uint8)
            .counted_by("data", PrimitiveType::Uint16, "len")
            .field("crc", PrimitiveType::Uint32)
            .finish()
            .unwrap();
        let report = LayoutReport::from_metadata(&meta);

        assert!(report.dynamic);
        assert_eq!(report.members[0].offset, Some(0));
        assert_eq!(report.members[1].size, None);
        assert_eq!(report.members[2].offset, None);

        let json: serde_json::Value = serde_json::from_str(&report.to_json(false).unwrap()).unwrap();
        assert_eq!(json["name"], "Packet");
        assert_eq!(json["members"][1]["length"], "len");
        assert_eq!(json["members"][2]["type"], "uint32");

        let text = report.to_string();
        assert!(text.starts_with("struct Packet (5+ bytes (dynamic)"));
        assert!(text.contains("data: uint16[len]"));
    }
}
