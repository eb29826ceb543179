use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Missing or placeholder process configuration. Always fatal.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The structured source could not be reached or answered with an unexpected shape.
    #[error("Source unavailable ({source_name}): {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Extraction failed for unit {unit}: {message}")]
    UnitExtractionFailed { unit: String, message: String },

    #[error("Write to '{table}' failed ({context}): {message}")]
    WriteFailed {
        table: String,
        context: String,
        message: String,
    },

    #[error("Read from '{table}' failed: {message}")]
    ReadFailed { table: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn source_unavailable(source_name: &str, message: impl Into<String>) -> Self {
        IngestError::SourceUnavailable {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn unit_failed(unit: &str, message: impl Into<String>) -> Self {
        IngestError::UnitExtractionFailed {
            unit: unit.to_string(),
            message: message.into(),
        }
    }

    /// Only configuration problems are allowed to abort a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(IngestError::Config("missing SUPABASE_URL".into()).is_fatal());
        assert!(!IngestError::unit_failed("94110", "timeout").is_fatal());
        assert!(!IngestError::source_unavailable("nces", "502").is_fatal());
    }

    #[test]
    fn write_failure_message_names_table_and_context() {
        let err = IngestError::WriteFailed {
            table: "clubs".into(),
            context: "unit 94110, 30 rows".into(),
            message: "duplicate key".into(),
        };
        let text = err.to_string();
        assert!(text.contains("clubs"));
        assert!(text.contains("94110"));
    }
}
