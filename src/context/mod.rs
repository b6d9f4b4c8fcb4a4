//! Coverage contexts: the catalog, the bit-indexed set type and the cross-database merge.
//!
//! A *context* is a named classification - a built-in block kind such as `static` or
//! `try`, or a user-defined regex - used to selectively include or exclude code regions
//! from coverage metrics. This module owns the whole context engine:
//!
//! # Key Components
//!
//! - [`ContextSet`] - immutable fixed-universe bit vector, the value type for "which
//!   contexts apply here"
//! - [`SimpleContext`], [`MethodRegexpContext`], [`StatementRegexpContext`] - catalog
//!   entries: reserved built-in contexts and user-defined regex contexts
//! - [`ContextStore`] - the catalog itself: index allocation, filter-spec parsing and
//!   context-set rendering
//! - [`merge_context_stores`] / [`ContextMapper`] - the cross-database merge used when
//!   combining independently instrumented builds
//!
//! # Index Stability
//!
//! Context indices are persisted alongside coverage data, so they must stay meaningful
//! across catalog changes: reserved contexts occupy a fixed range and are never
//! reassigned, and redefining a user context by name reuses its existing index. See
//! [`ContextStore`] for the full rules.

mod merge;
mod named;
mod set;
mod store;

pub use merge::{merge_context_stores, ContextMapper, MergeSource};
pub use named::{
    is_reserved_name, ContextKind, MethodRegexpContext, SimpleContext, StatementRegexpContext,
    CONTEXT_ASSERT, CONTEXT_CATCH, CONTEXT_CLOSURE, CONTEXT_CTOR, CONTEXT_DEPRECATED, CONTEXT_DO,
    CONTEXT_ELSE, CONTEXT_FINALLY, CONTEXT_FOR, CONTEXT_IF, CONTEXT_INSTANCE, CONTEXT_METHOD,
    CONTEXT_OFF, CONTEXT_PROPERTY, CONTEXT_STATIC, CONTEXT_SWITCH, CONTEXT_SYNC, CONTEXT_TRY,
    CONTEXT_WHILE, DEPRECATED_PATTERN, NEXT_INDEX_START, RESERVED_CONTEXTS,
};
pub use set::ContextSet;
pub use store::ContextStore;
