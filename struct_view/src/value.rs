/* Object-graph form of record instances */

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use struct_layout::{
    LayoutError, LayoutResult, MemberDescriptor, MemberType, Primitive, PrimitiveType,
    RecordMetadata, Scalar,
};

/* A member value detached from any buffer */
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    /* Contents of a byte or char array */
    Text(String),
    Array(Vec<Value>),
    Record(RecordValue),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut RecordValue> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

macro_rules! value_from_native {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Scalar(value.into())
                }
            }
        )*
    };
}

value_from_native!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        Value::Record(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Replaces the layout-driven encoding of a record value.
///
/// When a codec is attached to a [`RecordValue`], `serialize` and
/// `deserialize` hand the whole value to it instead of walking its members.
pub trait CustomCodec: fmt::Debug + Send + Sync {
    fn encode(&self, value: &RecordValue) -> LayoutResult<Vec<u8>>;

    fn decode(&self, value: &mut RecordValue, bytes: &[u8]) -> LayoutResult<()>;
}

/// Copy-based record instance: named member values plus the record type.
///
/// Members that were never set serialize as zero bytes.
#[derive(Debug, Clone)]
pub struct RecordValue {
    meta: Arc<RecordMetadata>,
    fields: IndexMap<String, Value>,
    codec: Option<Arc<dyn CustomCodec>>,
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.meta.name() == other.meta.name() && self.fields == other.fields
    }
}

impl RecordValue {
    pub fn new(meta: Arc<RecordMetadata>) -> Self {
        Self {
            meta,
            fields: IndexMap::new(),
            codec: None,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn CustomCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn metadata(&self) -> &Arc<RecordMetadata> {
        &self.meta
    }

    pub fn custom_codec(&self) -> Option<&Arc<dyn CustomCodec>> {
        self.codec.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Stores `value` after checking it fits the member's declared shape.
    ///
    /// Scalars are wrapped to the member's primitive type the same way a
    /// buffer write would wrap them.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> LayoutResult<()> {
        let desc = self.meta.member(name)?;
        let value = conform(desc, value.into())?;
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    pub fn scalar(&self, name: &str) -> LayoutResult<Scalar> {
        match self.fields.get(name) {
            Some(Value::Scalar(scalar)) => Ok(*scalar),
            Some(other) => Err(LayoutError::invalid_value(
                name,
                format!("expected a scalar, found {}", other.kind()),
            )),
            None => Err(LayoutError::missing_member(self.meta.name(), name)),
        }
    }

    pub fn get_as<T: Primitive>(&self, name: &str) -> LayoutResult<T> {
        self.scalar(name).map(T::from_scalar)
    }

    /// Nested record value of `name`, created empty if unset.
    pub fn record_mut(&mut self, name: &str) -> LayoutResult<&mut RecordValue> {
        let desc = self.meta.member(name)?;
        let declared = match (&desc.ty, desc.is_array()) {
            (MemberType::Record(meta), false) => Arc::clone(meta),
            _ => {
                return Err(LayoutError::TypeMismatch {
                    expected: "record".to_string(),
                    found: desc.ty.name().to_string(),
                })
            }
        };
        let entry = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| Value::Record(RecordValue::new(declared)));
        entry
            .as_record_mut()
            .ok_or_else(|| LayoutError::invalid_value(name, "expected a record"))
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn conform(desc: &MemberDescriptor, value: Value) -> LayoutResult<Value> {
    let shape_error = |expected: &str, found: &Value| {
        LayoutError::invalid_value(
            &desc.name,
            format!("expected {expected}, found {}", found.kind()),
        )
    };

    if let Some(limit) = desc.fixed_length() {
        let len = match &value {
            Value::Array(items) => items.len(),
            Value::Text(text) => text.len(),
            _ => 0,
        };
        if len > limit {
            return Err(LayoutError::invalid_value(
                &desc.name,
                format!("{len} elements exceed the fixed length {limit}"),
            ));
        }
    }

    match (&desc.ty, desc.is_array()) {
        (MemberType::Primitive(prim), false) => match value {
            Value::Scalar(scalar) => Ok(Value::Scalar(prim.normalize(scalar))),
            other => Err(shape_error("a scalar", &other)),
        },
        (MemberType::Primitive(prim), true) => {
            let scalars = match value {
                Value::Text(text) if prim.byte_width() == 1 => {
                    text.bytes().map(Scalar::from).collect()
                }
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::Scalar(scalar) => Ok(scalar),
                        other => Err(shape_error("scalar elements", &other)),
                    })
                    .collect::<LayoutResult<Vec<_>>>()?,
                other => return Err(shape_error("an array", &other)),
            };
            Ok(primitive_array(desc, *prim, scalars))
        }
        (MemberType::Record(declared), false) => match value {
            Value::Record(record) => {
                check_record_type(declared, &record)?;
                Ok(Value::Record(record))
            }
            other => Err(shape_error("a record", &other)),
        },
        (MemberType::Record(declared), true) => match value {
            Value::Array(items) => {
                for item in &items {
                    match item {
                        Value::Record(record) => check_record_type(declared, record)?,
                        other => return Err(shape_error("record elements", other)),
                    }
                }
                Ok(Value::Array(items))
            }
            other => Err(shape_error("an array", &other)),
        },
    }
}

/* Stored form of a primitive array: fixed arrays hold every element, zeros
 * included, and char arrays are text whenever their bytes are UTF-8 */
fn primitive_array(
    desc: &MemberDescriptor,
    prim: PrimitiveType,
    mut scalars: Vec<Scalar>,
) -> Value {
    if let Some(limit) = desc.fixed_length() {
        scalars.resize(limit, Scalar::Unsigned(0));
    }
    let scalars: Vec<Scalar> = scalars.into_iter().map(|s| prim.normalize(s)).collect();
    if desc.is_text() {
        let bytes = scalars.iter().map(|s| s.as_u128() as u8).collect();
        if let Ok(text) = String::from_utf8(bytes) {
            return Value::Text(text);
        }
    }
    Value::Array(scalars.into_iter().map(Value::Scalar).collect())
}

pub(crate) fn check_record_type(
    declared: &RecordMetadata,
    record: &RecordValue,
) -> LayoutResult<()> {
    if record.meta.is_a(declared) {
        Ok(())
    } else {
        Err(LayoutError::TypeMismatch {
            expected: declared.name().to_string(),
            found: record.meta.name().to_string(),
        })
    }
}
