//! Error types for the generator.
//!
//! Each component owns one error enum. Failures local to a single header
//! (unreadable input, parse failure) are collected by the driver instead of
//! aborting the run; only configuration and destination failures are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid invocation surface, detected before any work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required directory flag points at nothing.
    #[error("{flag} directory does not exist: {path}")]
    MissingDirectory { flag: &'static str, path: PathBuf },

    /// A required directory flag points at something that is not a directory.
    #[error("{flag} is not a directory: {path}")]
    NotADirectory { flag: &'static str, path: PathBuf },

    /// The directory exists but cannot be resolved to an absolute path.
    #[error("cannot resolve {flag} {path}: {source}")]
    Resolve {
        flag: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value that must be positive was zero.
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// The source parser could not produce a syntax tree for one file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The header could not be read.
    #[error("failed to read {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parser backend refused the grammar.
    #[error("parser backend unavailable: {0}")]
    Backend(String),

    /// The parser returned no tree at all.
    #[error("no syntax tree produced for {file}")]
    NoTree { file: PathBuf },
}

/// Failure persisting the build cache snapshot.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write build cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure owning or writing the generated destination.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The destination could not be opened for writing.
    #[error("cannot open destination {path}: {source}")]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination was opened but writing failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level failure of one generator run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Walking the source root failed.
    #[error("failed to walk source root: {0}")]
    Walk(#[from] walkdir::Error),

    /// Every candidate header failed to parse.
    #[error("all {} candidate headers failed to parse:\n{}", .0.len(), format_failures(.0))]
    AllFilesFailed(Vec<ParseError>),

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Result type alias for a generator run.
pub type DriverResult<T> = Result<T, DriverError>;

fn format_failures(errors: &[ParseError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("  {}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}
