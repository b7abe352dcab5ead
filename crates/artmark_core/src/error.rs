use thiserror::Error;

/// Problems found while loading site data; reported once, at profile load.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid selector `{query}` for `{key}`: {message}")]
    InvalidSelector {
        key: String,
        query: String,
        message: String,
    },
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("pattern `{0}` has no capture group")]
    MissingCaptureGroup(String),
    #[error("invalid selector table entry `{key}`: {reason}")]
    InvalidTable { key: String, reason: String },
}

/// A field-level extraction fault. Never escapes the sub-record that raised it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no node resolved for `{0}`")]
    MissingNode(String),
    #[error("`{field}` has no `{attr}` attribute")]
    MissingAttribute { field: String, attr: String },
    #[error("`{field}` value `{value}` does not match the expected pattern")]
    PatternMismatch { field: String, value: String },
    #[error("no path strategy applies to this page")]
    NoPathStrategy,
}
