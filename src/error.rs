use thiserror::Error;

macro_rules! format_error {
    ($($arg:tt)*) => {
        crate::Error::RegistryFormat {
            message: format!($($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of the context catalog, the versioned registry and its
/// binary persistence layer. Each variant provides specific context about the failure mode to
/// enable appropriate error handling.
///
/// # Error Categories
///
/// ## Context Catalog Errors
/// - [`Error::NamedContext`] - Reserved-name collision or other catalog conflict
/// - [`Error::InvalidPattern`] - A user context carried a regex that failed to compile
///
/// ## Registry Errors
/// - [`Error::ConcurrentModification`] - An update was prepared against a stale registry version
/// - [`Error::ReadOnlyRegistry`] - Mutation was attempted on a read-only (merged) registry
///
/// ## Persistence Errors
/// - [`Error::RegistryFormat`] - Corrupted or structurally invalid registry file
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use covreg::{CoverageRegistry, Error};
/// use std::path::Path;
///
/// match CoverageRegistry::from_file(Path::new("coverage.db")) {
///     Ok(Some(registry)) => {
///         println!("Loaded registry at version {}", registry.version());
///     }
///     Ok(None) => {
///         println!("No registry yet, starting fresh");
///     }
///     Err(Error::RegistryFormat { message, file, line }) => {
///         eprintln!("Corrupted registry: {} ({}:{})", message, file, line);
///     }
///     Err(e) => {
///         eprintln!("Other error: {}", e);
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A context name conflicted with the catalog.
    ///
    /// Returned when registering a user context whose name collides with one of the
    /// reserved built-in contexts, or when a merge re-add encounters a stale duplicate.
    /// The catalog is left unchanged.
    #[error("Named context conflict - {0}")]
    NamedContext(String),

    /// A user context regex failed to compile.
    ///
    /// The `name` field identifies the offending context; `source` carries the
    /// underlying regex error.
    #[error("Invalid pattern for context '{name}': {source}")]
    InvalidPattern {
        /// Name of the context whose pattern was rejected
        name: String,
        /// The underlying regex compilation error
        #[source]
        source: regex::Error,
    },

    /// The registry version moved while an update was in flight.
    ///
    /// This is the optimistic-concurrency race detector: the update was prepared against
    /// `expected` but the live model is already at `found`. The caller must re-read the
    /// registry and recompute the update. The check detects interim races only;
    /// instrumentation of a registry must still be externally serialized.
    #[error("Registry version moved from {expected} to {found} while an update was in flight")]
    ConcurrentModification {
        /// The version the update was prepared against
        expected: u64,
        /// The version actually found on the live model
        found: u64,
    },

    /// Mutation was attempted on a read-only registry.
    ///
    /// Registries produced by a merge are read-only; further instrumentation updates
    /// must go to a fresh or loaded read-write registry.
    #[error("Registry is read-only and cannot accept updates")]
    ReadOnlyRegistry,

    /// The registry file is damaged and could not be parsed.
    ///
    /// Distinct from a missing file, which is reported as "no registry" rather than an
    /// error. The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Registry format - {file}:{line}: {message}")]
    RegistryFormat {
        /// The message to be printed for the format error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding a buffer.
    ///
    /// A safety check to prevent overruns when decoding session segments; the registry
    /// layer surfaces this as a corruption error with file context.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during registry load and save, such as
    /// permission issues or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
