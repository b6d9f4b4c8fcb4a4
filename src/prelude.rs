//! # covreg Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the covreg library. Import this module to get quick access to the essential
//! types for coverage registry work.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all covreg operations
pub use crate::Error;

/// The result type used throughout covreg
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The versioned, persisted coverage registry
pub use crate::registry::CoverageRegistry;

/// Whether a registry accepts instrumentation updates
pub use crate::registry::AccessMode;

// ================================================================================================
// Context Engine
// ================================================================================================

/// The immutable context bit set and the catalog that allocates its indices
pub use crate::context::{ContextSet, ContextStore};

/// Catalog entry types for user-defined contexts
pub use crate::context::{ContextKind, MethodRegexpContext, StatementRegexpContext};

/// The cross-database merge entry point and its remapping result
pub use crate::context::{merge_context_stores, ContextMapper, MergeSource};

// ================================================================================================
// Registry Model and Updates
// ================================================================================================

/// Instrumentation session deltas and history records
pub use crate::registry::{
    EmptyProjectUpdate, FullProjectUpdate, InstrumentationInfo, RegistryUpdate,
};

/// The project element tree
pub use crate::registry::model::{
    BranchInfo, ClassInfo, FileInfo, MethodInfo, ProjectInfo, SourceRegion, StatementInfo,
};
