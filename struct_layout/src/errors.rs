use thiserror::Error;

/// Result alias used across the layout and view crates.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Errors raised while declaring records or accessing their bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Unregistered primitive name, or a non-record used where a record was required.
    #[error("invalid type '{type_name}'")]
    InvalidType { type_name: String },

    /// Counted-by field is missing, declared too late, or not an integer scalar.
    #[error("member '{record}.{member}' cannot be counted by '{counter}': {reason}")]
    InvalidCountField {
        record: String,
        member: String,
        counter: String,
        reason: &'static str,
    },

    /// The same member name was declared twice (inherited members included).
    #[error("record '{record}' declares member '{member}' more than once")]
    DuplicateMemberName { record: String, member: String },

    /// A record value of the wrong type was assigned to a record-typed member.
    #[error("expected a '{expected}' record but found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// Index beyond the current array length.
    #[error("index {index} out of bounds for length {length}")]
    OutOfBounds { index: usize, length: usize },

    /// The buffer is shorter than the layout requires.
    #[error("layout requires {required} bytes but only {available} available")]
    BufferTooSmall { required: usize, available: usize },

    /// Lookup of a member name that was never declared.
    #[error("record '{record}' has no member '{member}'")]
    MissingMember { record: String, member: String },

    /// A static size or offset was requested for a layout that depends on instance data.
    #[error("layout of '{name}' depends on instance data")]
    DynamicSize { name: String },

    /// A member whose type is a dynamic record must be the record's last member.
    #[error("dynamic member '{record}.{member}' must be the last member")]
    DynamicMemberNotLast { record: String, member: String },

    /// A member's size or offset does not fit in `usize`.
    #[error("member '{record}.{member}' makes the layout too large")]
    LayoutTooLarge { record: String, member: String },

    #[error("record '{record}' has invalid alignment {alignment}")]
    InvalidAlignment { record: String, alignment: u64 },

    #[error("record '{name}' is already declared")]
    DuplicateRecord { name: String },

    #[error("circular dependency between records: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    /// An object-graph value does not have the shape its member requires.
    #[error("invalid value for '{member}': {reason}")]
    InvalidValue { member: String, reason: String },
}

impl LayoutError {
    pub(crate) fn invalid_type(type_name: impl Into<String>) -> Self {
        LayoutError::InvalidType {
            type_name: type_name.into(),
        }
    }

    pub fn missing_member(record: impl Into<String>, member: impl Into<String>) -> Self {
        LayoutError::MissingMember {
            record: record.into(),
            member: member.into(),
        }
    }

    pub fn invalid_value(member: impl Into<String>, reason: impl Into<String>) -> Self {
        LayoutError::InvalidValue {
            member: member.into(),
            reason: reason.into(),
        }
    }
}

/// Checks that `available` bytes cover `offset + len`.
pub fn check_bounds(available: usize, offset: usize, len: usize) -> LayoutResult<()> {
    let required = offset.checked_add(len).ok_or(LayoutError::BufferTooSmall {
        required: usize::MAX,
        available,
    })?;
    if required > available {
        return Err(LayoutError::BufferTooSmall {
            required,
            available,
        });
    }
    Ok(())
}
