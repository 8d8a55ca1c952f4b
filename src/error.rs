//! Centralized error handling for flowline.
//!
//! Every data-flow failure caused by a misconfigured source, sink, or
//! pipeline surfaces as a variant of [`Error`], carrying the configuration
//! key path involved, the value found, and the expected shape, so that a
//! bad `config.yaml` can be diagnosed without reading the source.

use std::fmt;
use std::path::PathBuf;

/// Main error type for flowline operations.
#[derive(Debug)]
pub enum Error {
    /// I/O errors (file operations, directory creation, etc.)
    Io(std::io::Error),

    /// Dataframe processing errors from Polars
    Polars(polars::error::PolarsError),

    /// YAML parse errors
    Yaml(serde_yaml::Error),

    /// Invalid glob pattern in a source file key
    Pattern(glob::PatternError),

    /// Configuration errors: missing keys, wrong shapes, unknown options.
    /// `key` is the dotted path into the configuration document.
    Config { key: String, message: String },

    /// A resolved source/sink path escapes the configuration root
    FileNotInConfigDir {
        file: PathBuf,
        key: String,
        root: PathBuf,
    },

    /// A wildcard sink was built without a source to derive filenames from
    PatternedSinkMissingSource { pattern: String, key: String },

    /// `drain()` called before `build()`
    SinkNotBuilt,

    /// Number of prepared sink files does not match the number of tables queued
    DrainPipeMismatch { drains: usize, pipes: usize },

    /// A stage descriptor names a function absent from its catalog
    FunctionNotFound { catalog: String, name: String },

    /// A resolved stage failed during application
    StageFailed { stage: String, message: String },

    /// A verification stage's check did not hold for the required quantifier
    VerificationFailed { stage: String, failed: usize },

    /// `run()`/`run_one()` called before `connect()`
    LineNotConnected,

    /// Source file index out of range
    SourceIndex { index: usize, available: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Polars(e) => write!(f, "Dataframe error: {e}"),
            Self::Yaml(e) => write!(f, "YAML error: {e}"),
            Self::Pattern(e) => write!(f, "Invalid glob pattern: {e}"),
            Self::Config { key, message } => {
                write!(f, "Configuration error at '{key}': {message}")
            }
            Self::FileNotInConfigDir { file, key, root } => write!(
                f,
                "File '{}' from '{key}' is not inside the configuration root '{}'",
                file.display(),
                root.display()
            ),
            Self::PatternedSinkMissingSource { pattern, key } => write!(
                f,
                "Sink pattern '{pattern}' at '{key}' expects a source in the call to build()"
            ),
            Self::SinkNotBuilt => write!(f, "Sink is not yet built"),
            Self::DrainPipeMismatch { drains, pipes } => {
                write!(f, "Sink has {drains} drains but got {pipes} pipes")
            }
            Self::FunctionNotFound { catalog, name } => {
                write!(f, "Function '{name}' not found in catalog '{catalog}'")
            }
            Self::StageFailed { stage, message } => {
                write!(f, "Stage '{stage}' failed: {message}")
            }
            Self::VerificationFailed { stage, failed } => {
                write!(f, "Stage '{stage}': check failed for {failed} row(s)")
            }
            Self::LineNotConnected => {
                write!(f, "Line is not connected: call connect(source, sink) first")
            }
            Self::SourceIndex { index, available } => write!(
                f,
                "Source index {index} out of range ({available} file(s) drawn)"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Polars(e) => Some(e),
            Self::Yaml(e) => Some(e),
            Self::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Polars(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err)
    }
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Self::Pattern(err)
    }
}

impl From<glob::GlobError> for Error {
    fn from(err: glob::GlobError) -> Self {
        Self::Io(err.into_error())
    }
}

/// Result type alias for flowline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a path-annotated configuration error.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
