use serde_derive::{Deserialize, Serialize};

fn default_alignment() -> u64 {
    1
}

/// Layout options applied to a whole record.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RecordOptions {
    /// Every member's end is rounded up to a multiple of this (1 = packed).
    #[serde(default = "default_alignment")]
    pub alignment: u64,
    #[serde(default)]
    pub big_endian: bool,
    #[serde(default, rename = "union")]
    pub is_union: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            alignment: 1,
            big_endian: false,
            is_union: false,
            comment: None,
        }
    }
}

impl RecordOptions {
    pub fn aligned(alignment: u64) -> Self {
        Self {
            alignment,
            ..Self::default()
        }
    }

    pub fn big_endian() -> Self {
        Self {
            big_endian: true,
            ..Self::default()
        }
    }

    pub fn union() -> Self {
        Self {
            is_union: true,
            ..Self::default()
        }
    }
}

/// Element count of an array member.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(untagged)]
#[serde(expecting = "expected an element count or the name of a counter field")]
pub enum MemberLength {
    Fixed(u64),
    /// Name of an earlier integer field holding the element count.
    CountedBy(String),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct MemberDecl {
    pub name: String,
    /// Primitive type name (`uint16`, `f32`, `char`, ...) or record name.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<MemberLength>,
}

impl MemberDecl {
    pub fn scalar(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: None,
        }
    }

    pub fn array(name: impl Into<String>, type_name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: Some(MemberLength::Fixed(length)),
        }
    }

    pub fn counted_by(
        name: impl Into<String>,
        type_name: impl Into<String>,
        counter: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: Some(MemberLength::CountedBy(counter.into())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RecordDecl {
    pub name: String,
    /// Base record whose layout is prepended to this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(flatten)]
    pub options: RecordOptions,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
}

impl RecordDecl {
    /// Type names this declaration needs resolved before it can be built.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.extends
            .as_deref()
            .into_iter()
            .chain(self.members.iter().map(|m| m.type_name.as_str()))
    }
}

/// Top-level contents of a declaration file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct LayoutFile {
    #[serde(default)]
    pub records: Vec<RecordDecl>,
}

impl LayoutFile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }
}
