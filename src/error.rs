//! Domain-specific error types for city-analogues

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the extractor and the boundary fetcher
#[derive(Error, Debug)]
pub enum AnalogueError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input file not found: {}", .path.display())]
    InputFileMissing { path: PathBuf },

    #[error("CSV error: {message}")]
    Csv { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The geocoding service answered 403; the run must stop.
    #[error("Rate limit exceeded while resolving '{city}' (HTTP 403)")]
    RateLimitExceeded { city: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Geometry error: {message}")]
    Geometry { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl AnalogueError {
    /// True for errors that must abort the whole run rather than a single city
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, AnalogueError::RateLimitExceeded { .. })
    }
}

impl From<csv::Error> for AnalogueError {
    fn from(err: csv::Error) -> Self {
        AnalogueError::Csv {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AnalogueError {
    fn from(err: std::io::Error) -> Self {
        AnalogueError::Io {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AnalogueError {
    fn from(err: rusqlite::Error) -> Self {
        AnalogueError::Cache {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AnalogueError {
    fn from(err: reqwest::Error) -> Self {
        AnalogueError::Http {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<serde_json::Error> for AnalogueError {
    fn from(err: serde_json::Error) -> Self {
        AnalogueError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<geojson::Error> for AnalogueError {
    fn from(err: geojson::Error) -> Self {
        AnalogueError::Geometry {
            message: err.to_string(),
        }
    }
}

/// Result type alias for city-analogues operations
pub type Result<T> = std::result::Result<T, AnalogueError>;
