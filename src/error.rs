use std::fmt;

use crate::value::Value;

/// Stable codec failure code. Callers pattern-match on this (or its numeric
/// form) for retry / reporting logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidNumber,
    BelowMinimum,
    AboveMaximum,
    NotStringOrNumber,
    ColumnNotInSchema,
}

impl ErrorCode {
    /// Numeric form of the code. Frozen — wire-visible in logs and reports.
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::InvalidNumber => 1,
            ErrorCode::BelowMinimum => 2,
            ErrorCode::AboveMaximum => 3,
            ErrorCode::NotStringOrNumber => 4,
            ErrorCode::ColumnNotInSchema => 5,
        }
    }
}

/// Encode-time failure — returned by the scalar codec and the row
/// transformer. Carries the offending value and, once the row transformer
/// has re-raised it, the offending column.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecError {
    pub code: ErrorCode,
    pub message: String,
    pub value: Option<Value>,
    pub column: Option<String>,
}

impl CodecError {
    fn new(code: ErrorCode, message: String, value: Option<Value>) -> Self {
        Self { code, message, value, column: None }
    }

    pub fn invalid_number(value: &Value) -> Self {
        Self::new(
            ErrorCode::InvalidNumber,
            format!("not a number: {value:?}"),
            Some(value.clone()),
        )
    }

    pub fn below_minimum(value: &Value, min: f64) -> Self {
        Self::new(
            ErrorCode::BelowMinimum,
            format!("value below minimum {min}: {value:?}"),
            Some(value.clone()),
        )
    }

    pub fn above_maximum(value: &Value, max: f64) -> Self {
        Self::new(
            ErrorCode::AboveMaximum,
            format!("value above maximum {max}: {value:?}"),
            Some(value.clone()),
        )
    }

    pub fn not_string_or_number(value: &Value) -> Self {
        Self::new(
            ErrorCode::NotStringOrNumber,
            format!("not a string or number: {value:?}"),
            Some(value.clone()),
        )
    }

    pub fn column_not_in_schema(column: &str) -> Self {
        let mut err = Self::new(
            ErrorCode::ColumnNotInSchema,
            format!("column not described in schema: {column}"),
            None,
        );
        err.column = Some(column.to_string());
        err
    }

    /// Attach the offending column, preserving the code.
    ///
    /// Produces: `"original message (column: name)"`.
    pub fn with_column(self, column: &str) -> Self {
        Self {
            code: self.code,
            message: format!("{} (column: {column})", self.message),
            value: self.value,
            column: Some(column.to_string()),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_u16(), self.message)
    }
}

impl std::error::Error for CodecError {}

/// Failure surfaced by the underlying driver, with whatever position
/// information the store's exception text carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    pub code: Option<i64>,
    pub scope: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Default::default() }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.scope, self.code) {
            (Some(scope), Some(code)) => write!(f, "{scope} (code {code}): {}", self.message),
            (Some(scope), None) => write!(f, "{scope}: {}", self.message),
            (None, Some(code)) => write!(f, "code {code}: {}", self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Top-level error for all client operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("driver: {0}")]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::{CodecError, ErrorCode};
    use crate::value::Value;

    #[test]
    fn with_column_appends_name_and_keeps_code() {
        let err = CodecError::invalid_number(&Value::String("abc".into())).with_column("age");
        assert_eq!(err.code, ErrorCode::InvalidNumber);
        assert!(err.message.contains("age"));
        assert_eq!(err.column.as_deref(), Some("age"));
    }

    #[test]
    fn numeric_codes_are_distinct() {
        let codes = [
            ErrorCode::InvalidNumber,
            ErrorCode::BelowMinimum,
            ErrorCode::AboveMaximum,
            ErrorCode::NotStringOrNumber,
            ErrorCode::ColumnNotInSchema,
        ];
        let mut seen: Vec<u16> = codes.iter().map(|c| c.as_u16()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
    }
}
