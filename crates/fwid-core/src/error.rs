//! Fingerprint database errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type for database construction and catalog loading
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised while building the fingerprint database
///
/// All of these are data errors: they are reported at startup and are not
/// meant to be recovered from at runtime.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A model key appears under more than one brand
    #[error("Model {model} is listed under both {first} and {second}")]
    DuplicateModel {
        model: String,
        first: String,
        second: String,
    },

    /// Two catalogs declare the same brand
    #[error("Brand defined more than once: {0}")]
    DuplicateBrand(String),

    /// Catalog file could not be read
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog document is not valid YAML for the catalog schema
    #[error("Failed to parse catalog {name}: {message}")]
    Parse { name: String, message: String },

    /// A field holds a value outside its allowed range or format
    #[error("Invalid value in catalog {name}: {message}")]
    InvalidValue { name: String, message: String },
}
