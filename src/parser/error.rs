use std::path::PathBuf;

/// Errors that can occur while reading manifests and requirement lists.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to read the file from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML content.
    #[error("Failed to parse TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An INI-style file (setup.cfg, entry_points.txt) is malformed.
    #[error("Invalid INI syntax at line {line}: {reason}")]
    Ini { line: usize, reason: String },

    /// A dependency specifier has no recognizable package name.
    #[error("Invalid requirement: {0:?}")]
    InvalidRequirement(String),

    /// An environment marker could not be parsed.
    #[error("Invalid environment marker {marker:?}: {reason}")]
    InvalidMarker { marker: String, reason: String },
}

/// Result type alias for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.into(),
            source,
        }
    }
}
