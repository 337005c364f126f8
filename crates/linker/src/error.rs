use std::fmt;

#[derive(Debug)]
pub enum LinkError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, weights, rule table, etc.).
    ConfigValidation(String),
    /// A record is missing a required field and was rejected at construction.
    InvalidRecord { source: String, record_id: String, reason: String },
    /// Missing required column in input data.
    MissingColumn { source: String, column: String },
    /// Geometry column could not be parsed into coordinates.
    GeometryParse { segment_id: String, value: String },
    /// No usable registry or map data remained for the requested locality.
    NoData { locality: String },
    /// IO error (file read, CSV decode, etc.).
    Io(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidRecord { source, record_id, reason } => {
                if record_id.is_empty() {
                    write!(f, "{source}: invalid record: {reason}")
                } else {
                    write!(f, "{source}, record '{record_id}': {reason}")
                }
            }
            Self::MissingColumn { source, column } => {
                write!(f, "{source}: missing column '{column}'")
            }
            Self::GeometryParse { segment_id, value } => {
                write!(f, "segment '{segment_id}': cannot parse geometry '{value}'")
            }
            Self::NoData { locality } => {
                write!(f, "no data available for this locality: '{locality}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}
