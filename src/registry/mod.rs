//! The versioned project registry: model tree, update protocol and persistence.
//!
//! A [`CoverageRegistry`] records which regions of instrumented source exist, which
//! contexts apply to each, and how successive instrumentation runs accumulate into one
//! versioned, persistable model.
//!
//! # Key Components
//!
//! - [`model`] - the project element tree: files, classes, methods, statements, branches
//! - [`update`] - instrumentation session deltas ([`RegistryUpdate`]) and the history
//!   records they leave behind ([`InstrumentationInfo`])
//! - [`CoverageRegistry`] - orchestrates the model, the active context store, the
//!   history and load/append/overwrite persistence
//!
//! # Persistence
//!
//! Registry files are a header followed by appended session segments; loading folds the
//! sessions newest-to-oldest into one cumulative model. Appending a session is cheap;
//! a full rewrite replays the history as synthetic empty sessions followed by one
//! snapshot, preserving version lineage for historical reporting.

pub mod model;
pub mod update;

mod registry;

pub use registry::{AccessMode, CoverageRegistry};
pub use update::{EmptyProjectUpdate, FullProjectUpdate, InstrumentationInfo, RegistryUpdate};
