//! Centralized error handling for filecube
//!
//! Configuration errors are raised while compiling a pregex or setting up a
//! filegroup, discovery and data errors at the end of a scan pass. A selection
//! missing from a filegroup is not an error: command generation returns
//! nothing for that filegroup.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for filecube operations
#[derive(Debug, Error)]
pub enum FilecubeError {
    /// NetCDF file operation errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Directory traversal errors
    #[error("Failed to walk directory: {0}")]
    WalkError(#[from] walkdir::Error),

    /// The compiled pregex is not a valid regex
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// Malformed placeholder or unknown matcher kind
    #[error("Invalid pre-regex '{pregex}': {message}")]
    InvalidPregex { pregex: String, message: String },

    /// A `%(name)` literal with no substitution
    #[error("Placeholder '%({name})' has no replacement in pre-regex '{pregex}'")]
    UnresolvedPlaceholder { name: String, pregex: String },

    /// A matcher or coordinate spec names a dimension the filegroup does not have
    #[error("Dimension '{dim}' is not part of filegroup '{filegroup}'")]
    UnknownDimension { filegroup: String, dim: String },

    /// A custom parser identifier was never registered
    #[error("No custom parser '{parser}' registered (filegroup '{filegroup}', dimension '{dim}')")]
    UnregisteredParser {
        filegroup: String,
        dim: String,
        parser: String,
    },

    /// Invalid filegroup or dimension setup
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Scan pass found no file matching the compiled pattern
    #[error("No file matching the regex found in {root} (filegroup '{filegroup}', regex={regex})")]
    NoMatchingFile {
        filegroup: String,
        root: PathBuf,
        regex: String,
    },

    /// A scanned dimension ended with no values
    #[error("No values detected for dimension '{dim}' (filegroup '{filegroup}')")]
    NoValues { filegroup: String, dim: String },

    /// Two files claim the same coordinate value
    #[error(
        "Value {value} of dimension '{dim}' found in both {first} and {second} (filegroup '{filegroup}')"
    )]
    CoordinateConflict {
        filegroup: String,
        dim: String,
        value: f64,
        first: PathBuf,
        second: PathBuf,
    },

    /// Matched filename text could not be turned into a value
    #[error("Cannot parse '{text}' for dimension '{dim}': {message}")]
    ValueParse {
        dim: String,
        text: String,
        message: String,
    },

    /// Dimension not found in a keyring or dimension set
    #[error("Dimension '{dim}' not found")]
    DimensionNotFound { dim: String },

    /// Key pointing outside of a dimension or array
    #[error("Invalid key for dimension '{dim}': {message}")]
    InvalidKey { dim: String, message: String },

    /// In-file and memory keyrings disagree after command generation
    #[error("Infile and memory keyrings have different shapes ({0})")]
    ShapeMismatch(String),

    /// Failure reported by a file backend
    #[error("Backend error on {path}: {message}")]
    Backend { path: PathBuf, message: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),
}

impl FilecubeError {
    /// Create a Backend error.
    pub fn backend(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Backend {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a DimensionNotFound error.
    pub fn dimension_not_found(dim: impl Into<String>) -> Self {
        Self::DimensionNotFound { dim: dim.into() }
    }

    /// Whether the error stems from configuration rather than data on disk.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Regex(_)
                | Self::InvalidPregex { .. }
                | Self::UnresolvedPlaceholder { .. }
                | Self::UnknownDimension { .. }
                | Self::UnregisteredParser { .. }
                | Self::Config(_)
        )
    }
}

/// Result type alias for filecube operations
pub type Result<T> = std::result::Result<T, FilecubeError>;
