//! Request parameter validation
//!
//! Parameters arrive as optional raw strings. Absent and blank are the same
//! thing; numeric ids must parse as integers.

/// Client input error. Always a 400, never a server fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),
    #[error("{name} must be an integer, got {value:?}")]
    InvalidParameter { name: &'static str, value: String },
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A required string parameter such as `funder_id`.
pub fn required_str<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, QueryError> {
    present(value).ok_or(QueryError::MissingParameter(name))
}

/// A required numeric id such as `field_id`.
pub fn required_id(name: &'static str, value: Option<&str>) -> Result<u32, QueryError> {
    let raw = required_str(name, value)?;
    parse_id(name, raw)
}

/// An optional numeric id; blank counts as absent.
pub fn optional_id(name: &'static str, value: Option<&str>) -> Result<Option<u32>, QueryError> {
    present(value).map(|raw| parse_id(name, raw)).transpose()
}

/// An optional string filter; blank counts as absent.
pub fn optional_str(value: Option<&str>) -> Option<String> {
    present(value).map(str::to_string)
}

fn parse_id(name: &'static str, raw: &str) -> Result<u32, QueryError> {
    raw.parse().map_err(|_| QueryError::InvalidParameter {
        name,
        value: raw.to_string(),
    })
}
