#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # covreg
//!
//! A coverage context registry and filtering engine: records, per project, which regions
//! of instrumented source code exist, which *coverage contexts* (named filters such as
//! `static`, `try`, or user regex patterns) apply to each region, and how successive
//! instrumentation runs accumulate into one versioned, persistable model.
//!
//! ## Features
//!
//! - **Bit-indexed context catalog** - compact [`context::ContextSet`] values over a
//!   catalog of reserved and user-defined contexts, with index stability across
//!   redefinition so historical coverage data stays valid
//! - **Context filter mini-language** - comma/space separated context names with
//!   inversion, unknown names warned and ignored
//! - **Versioned registry** - optimistic-concurrency update protocol over an in-memory
//!   project model, with newest-first instrumentation history
//! - **Two-mode persistence** - cheap session appends when the backing file permits,
//!   full history-preserving rewrites otherwise
//! - **Cross-database merge** - combine independently instrumented builds into one
//!   registry with consistent context indices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use covreg::prelude::*;
//! use std::path::Path;
//!
//! // Load an existing registry, or start fresh
//! let mut registry = CoverageRegistry::create_or_load(Path::new("coverage.db"), "demo")?;
//!
//! // Build a context filter from a user spec
//! let filter = registry
//!     .context_store()
//!     .create_context_set_filter("static, try", false);
//! assert!(filter.get(covreg::context::CONTEXT_STATIC));
//!
//! // An instrumenter applies its session delta against the version it read
//! let expected = registry.version();
//! # let update = covreg::registry::RegistryUpdate::Empty(covreg::registry::EmptyProjectUpdate { version: 1, start_ts: 0, end_ts: 0 });
//! registry.apply_update(expected, update)?;
//! registry.save_and_append()?;
//! # Ok::<(), covreg::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `covreg` is organized into these modules:
//!
//! - [`prelude`] - convenient re-exports of commonly used types
//! - [`context`] - the context catalog, set type and cross-database merge
//! - [`registry`] - the versioned project model, update protocol and persistence
//! - [`io`] - tagged binary read/write primitives, the serialization boundary
//! - [`Error`] and [`Result`] - comprehensive error handling
//!
//! ### Concurrency Model
//!
//! There is no internal locking. Instrumentation of a registry must be externally
//! serialized; the version check in [`registry::CoverageRegistry::apply_update`] detects
//! interim races but provides no mutual exclusion. Background coverage loads take an
//! isolated snapshot via [`registry::CoverageRegistry::copy_for_background_load`]
//! instead of sharing the live instance.

#[macro_use]
pub(crate) mod error;

pub mod context;
pub mod io;
pub mod prelude;
pub mod registry;

/// The result type used throughout covreg.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type covering every failure mode of this library.
pub use error::Error;

/// Main entry point: the versioned, persisted coverage registry.
pub use registry::CoverageRegistry;

/// The context catalog and the bit-indexed set type it deals in.
pub use context::{ContextSet, ContextStore};
