//! Named context catalog entries.
//!
//! A *context* is a named classification applied to code regions so they can be
//! selectively included in or excluded from coverage metrics. Built-in block contexts
//! (`static`, `try`, ...) occupy the reserved index range and are process-wide constants;
//! user-defined contexts carry a compiled regex and are allocated indices by the
//! [`crate::context::ContextStore`].

use std::fmt;

use regex::Regex;

use crate::{Error, Result};

/// Index of the reserved "instrumentation disabled" marker context.
///
/// This bit is forced on in every filter produced by the catalog's spec parser so that
/// detection of disabled coverage can never be accidentally filtered away.
pub const CONTEXT_OFF: usize = 0;
/// Index of the `static` initializer block context
pub const CONTEXT_STATIC: usize = 1;
/// Index of the instance initializer block context
pub const CONTEXT_INSTANCE: usize = 2;
/// Index of the constructor body context
pub const CONTEXT_CTOR: usize = 3;
/// Index of the method body context
pub const CONTEXT_METHOD: usize = 4;
/// Index of the `switch` statement context
pub const CONTEXT_SWITCH: usize = 5;
/// Index of the `while` loop context
pub const CONTEXT_WHILE: usize = 6;
/// Index of the `do` loop context
pub const CONTEXT_DO: usize = 7;
/// Index of the `for` loop context
pub const CONTEXT_FOR: usize = 8;
/// Index of the `if` branch context
pub const CONTEXT_IF: usize = 9;
/// Index of the `else` branch context
pub const CONTEXT_ELSE: usize = 10;
/// Index of the `try` block context
pub const CONTEXT_TRY: usize = 11;
/// Index of the `catch` block context
pub const CONTEXT_CATCH: usize = 12;
/// Index of the `finally` block context
pub const CONTEXT_FINALLY: usize = 13;
/// Index of the synchronized block context
pub const CONTEXT_SYNC: usize = 14;
/// Index of the `assert` statement context
pub const CONTEXT_ASSERT: usize = 15;
/// Index of the reserved regex context matching deprecated methods
pub const CONTEXT_DEPRECATED: usize = 16;
/// Index of the property accessor context
pub const CONTEXT_PROPERTY: usize = 17;
/// Index of the closure body context
pub const CONTEXT_CLOSURE: usize = 18;

/// First index available for user-defined contexts
pub const NEXT_INDEX_START: usize = 19;

/// Pattern carried by the reserved [`CONTEXT_DEPRECATED`] method context
pub const DEPRECATED_PATTERN: &str = r"(?s).*@([a-zA-Z.]+\.)?Deprecated(\s.*)?";

/// The kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Built-in block context, reserved index range
    Block,
    /// User (or reserved) method regex context
    Method,
    /// User statement regex context
    Statement,
}

/// A reserved, process-wide constant context.
///
/// The reserved table is built once and never mutated; every [`crate::context::ContextStore`]
/// shares it by reference.
#[derive(Debug, Clone, Copy)]
pub struct SimpleContext {
    index: usize,
    name: &'static str,
    kind: ContextKind,
}

impl SimpleContext {
    /// The fixed index of this reserved context
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The reserved name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this entry is a block or a reserved regex context
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }
}

/// The reserved context table, indices `0..NEXT_INDEX_START`.
///
/// Index positions are part of the persisted format and must never be reassigned:
/// coverage data tagged with these bits stays valid across registry versions.
pub static RESERVED_CONTEXTS: [SimpleContext; NEXT_INDEX_START] = [
    SimpleContext { index: CONTEXT_OFF, name: "off", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_STATIC, name: "static", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_INSTANCE, name: "instance", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_CTOR, name: "constructor", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_METHOD, name: "method", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_SWITCH, name: "switch", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_WHILE, name: "while", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_DO, name: "do", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_FOR, name: "for", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_IF, name: "if", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_ELSE, name: "else", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_TRY, name: "try", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_CATCH, name: "catch", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_FINALLY, name: "finally", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_SYNC, name: "sync", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_ASSERT, name: "assert", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_DEPRECATED, name: "@deprecated", kind: ContextKind::Method },
    SimpleContext { index: CONTEXT_PROPERTY, name: "property", kind: ContextKind::Block },
    SimpleContext { index: CONTEXT_CLOSURE, name: "closure", kind: ContextKind::Block },
];

/// Returns true if `name` is one of the reserved context names
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_CONTEXTS.iter().any(|ctx| ctx.name == name)
}

/// Looks up a reserved context of the given kind by name
#[must_use]
pub(crate) fn reserved_by_name(name: &str, kind: ContextKind) -> Option<&'static SimpleContext> {
    RESERVED_CONTEXTS
        .iter()
        .find(|ctx| ctx.kind == kind && ctx.name == name)
}

/// A user-defined method context: methods whose signature matches the pattern, and whose
/// metrics stay within the thresholds, belong to this context.
///
/// The four thresholds are consumed by the instrumenter when deciding whether a candidate
/// method body matches; they default to "unlimited" (`u32::MAX`).
#[derive(Debug, Clone)]
pub struct MethodRegexpContext {
    index: usize,
    name: String,
    pattern: Regex,
    max_complexity: u32,
    max_statements: u32,
    max_aggregated_complexity: u32,
    max_aggregated_statements: u32,
}

impl MethodRegexpContext {
    /// Creates a method context with unlimited thresholds.
    ///
    /// The index is assigned when the context is added to a store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if `pattern` is not a valid regex.
    pub fn new(name: &str, pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        Ok(MethodRegexpContext {
            index: 0,
            name: name.to_string(),
            pattern: compiled,
            max_complexity: u32::MAX,
            max_statements: u32::MAX,
            max_aggregated_complexity: u32::MAX,
            max_aggregated_statements: u32::MAX,
        })
    }

    /// Sets the complexity and statement thresholds.
    ///
    /// `u32::MAX` means unlimited.
    #[must_use]
    pub fn with_limits(
        mut self,
        max_complexity: u32,
        max_statements: u32,
        max_aggregated_complexity: u32,
        max_aggregated_statements: u32,
    ) -> Self {
        self.max_complexity = max_complexity;
        self.max_statements = max_statements;
        self.max_aggregated_complexity = max_aggregated_complexity;
        self.max_aggregated_statements = max_aggregated_statements;
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// The catalog index of this context, assigned by the owning store
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The unique context name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern source string; merge equivalence is syntactic over this string
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns true if `signature` matches this context's pattern
    #[must_use]
    pub fn matches(&self, signature: &str) -> bool {
        self.pattern.is_match(signature)
    }

    /// Maximum cyclomatic complexity for a matching method
    #[must_use]
    pub fn max_complexity(&self) -> u32 {
        self.max_complexity
    }

    /// Maximum statement count for a matching method
    #[must_use]
    pub fn max_statements(&self) -> u32 {
        self.max_statements
    }

    /// Maximum aggregated complexity (method plus nested closures) for a match
    #[must_use]
    pub fn max_aggregated_complexity(&self) -> u32 {
        self.max_aggregated_complexity
    }

    /// Maximum aggregated statement count for a match
    #[must_use]
    pub fn max_aggregated_statements(&self) -> u32 {
        self.max_aggregated_statements
    }
}

/// A user-defined statement context: statements whose source text matches the pattern
/// belong to this context.
#[derive(Debug, Clone)]
pub struct StatementRegexpContext {
    index: usize,
    name: String,
    pattern: Regex,
}

impl StatementRegexpContext {
    /// Creates a statement context. The index is assigned when the context is added to
    /// a store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPattern`] if `pattern` is not a valid regex.
    pub fn new(name: &str, pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        Ok(StatementRegexpContext {
            index: 0,
            name: name.to_string(),
            pattern: compiled,
        })
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// The catalog index of this context, assigned by the owning store
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The unique context name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern source string; merge equivalence is syntactic over this string
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns true if `text` matches this context's pattern
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl fmt::Display for SimpleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
