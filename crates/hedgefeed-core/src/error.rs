use thiserror::Error;

/// Validation errors raised while building requests and records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: String, end: String },
    #[error("unrecognized timestamp '{value}'")]
    InvalidTimestamp { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("cost basis for '{side}' shares requires a positive share count")]
    OrphanCostBasis { side: &'static str },

    #[error("'{field}' must be greater than zero")]
    ZeroLimit { field: &'static str },
    #[error("'{field}' must include at least one entry")]
    EmptyList { field: &'static str },
}

/// Errors raised while assembling a provider from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url for {name}: '{value}'")]
    InvalidUrl { name: &'static str, value: String },

    #[error("failed to read gateway certificate '{path}': {source}")]
    CertificateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway certificate '{path}' is not valid PEM: {source}")]
    CertificateParse {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// A payload that could not be mapped onto a canonical record shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("expected a {record} object, a list of them or an object with a '{field}' list; found {found}")]
    UnexpectedShape {
        record: &'static str,
        field: &'static str,
        found: &'static str,
    },

    #[error("{record} at position {index} is malformed: {message}")]
    MalformedRecord {
        record: &'static str,
        index: usize,
        message: String,
    },

    #[error("{record} at position {index} failed validation: {source}")]
    InvalidRecord {
        record: &'static str,
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("row {index} has no 'time' or 'date' field")]
    MissingTimestamp { index: usize },

    #[error("row {index} has an unreadable timestamp '{value}'")]
    UnreadableTimestamp { index: usize, value: String },

    #[error("invalid JSON payload: {message}")]
    InvalidJson { message: String },
}
