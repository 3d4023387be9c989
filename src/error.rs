//! Error types for native library loading.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, binding, or unloading native libraries.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// No loader backend exists for the running platform.
    #[error("LoadLibrary failed: unknown OS '{platform}'")]
    PlatformUnsupported { platform: String },

    /// The platform loader could not open the resolved path.
    #[error("unable to load library {library}: {}: {reason}", .path.display())]
    OpenFailed {
        library: String,
        path: PathBuf,
        reason: String,
    },

    /// The platform loader could not release a native handle.
    #[error("unable to unload library {library}: {reason}")]
    CloseFailed { library: String, reason: String },

    /// A declared symbol was not exported by the opened module.
    #[error("cannot load symbol {symbol} from {library}")]
    MissingSymbol { library: String, symbol: String },

    /// A library was declared without a name.
    #[error("library name must not be empty")]
    EmptyLibraryName,

    /// The name is already registered with a different symbol schema.
    #[error("library {library} is already registered with a different symbol schema")]
    DuplicateRegistration { library: String },

    /// One or more libraries failed during a registry-wide operation.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The loader configuration could not be read, parsed, or written.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

impl LoaderError {
    /// Name of the library the error refers to, if any.
    #[must_use]
    pub fn library(&self) -> Option<&str> {
        match self {
            LoaderError::OpenFailed { library, .. }
            | LoaderError::CloseFailed { library, .. }
            | LoaderError::MissingSymbol { library, .. }
            | LoaderError::DuplicateRegistration { library } => Some(library),
            LoaderError::PlatformUnsupported { .. }
            | LoaderError::EmptyLibraryName
            | LoaderError::Batch(_)
            | LoaderError::Config { .. } => None,
        }
    }
}

/// Registry-wide operation that produced a [`BatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Load,
    Unload,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOperation::Load => write!(f, "load"),
            BatchOperation::Unload => write!(f, "unload"),
        }
    }
}

/// Aggregate failure of `load_all` / `unload_all`.
///
/// Every library is attempted; each failure is kept alongside the name of the
/// library that produced it.
#[derive(Debug)]
pub struct BatchError {
    pub operation: BatchOperation,
    pub attempted: usize,
    pub failures: Vec<(String, LoaderError)>,
}

impl BatchError {
    /// Names of the libraries that failed, in the order they were attempted.
    pub fn failed_libraries(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {} of {} libraries",
            self.operation,
            self.failures.len(),
            self.attempted
        )?;
        for (name, err) in &self.failures {
            write!(f, "\n  {name}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}
