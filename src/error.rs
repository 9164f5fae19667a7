use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinesError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Two canonical teams claim the same case-folded spelling.
    #[error("Configuration error: variation '{variation}' is claimed by both '{first}' and '{second}'")]
    ConflictingVariation {
        variation: String,
        first: String,
        second: String,
    },

    #[error("Source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl LinesError {
    pub fn unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        LinesError::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Errors that must abort the run before any processing happens.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, LinesError::Config(_) | LinesError::ConflictingVariation { .. })
    }
}

pub type Result<T> = std::result::Result<T, LinesError>;
