use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid rule option: {0}")]
    InvalidOption(String),

    #[error("invalid logic expression: {0}")]
    InvalidLogic(String),

    #[error("unregistered {kind} type: {tag}")]
    UnregisteredTag { kind: &'static str, tag: String },

    #[error("invalid regex in text condition: {0}")]
    Regex(#[from] regex::Error),

    #[error("(de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
