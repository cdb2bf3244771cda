//! Error types for the vocals scoring core.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Difficulty value outside Easy/Medium/Hard/Expert
    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(String),

    /// Engine or player configuration out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Note track violates ordering or overlap rules
    #[error("Invalid note track: {0}")]
    InvalidTrack(String),

    /// Chart content could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed XML
    #[error("XML error: {0}")]
    Xml(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}
