use thiserror::Error;

/// Document-level failures. Any of these aborts the whole analysis request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Document unreachable: {0}")]
    Unreachable(String),

    #[error("Document link expired or forbidden: {0}")]
    Expired(String),

    #[error("Not a parseable PDF: {0}")]
    Unparseable(String),

    #[error("Document has no pages")]
    EmptyDocument,
}

/// Failures local to a single tool run. They never leave the tool envelope.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);
