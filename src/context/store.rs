//! The context catalog: reserved and user-defined contexts, index allocation, filter
//! parsing and context-set rendering.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::context::named::{
    is_reserved_name, reserved_by_name, ContextKind, MethodRegexpContext, SimpleContext,
    StatementRegexpContext, CONTEXT_OFF, NEXT_INDEX_START, RESERVED_CONTEXTS,
};
use crate::context::set::ContextSet;
use crate::io::{TaggedDataInput, TaggedDataOutput};
use crate::{Error, Result};

/// The catalog of all contexts known to one registry.
///
/// A store owns the two name-keyed user catalogs (method-regex and statement-regex) and
/// a monotonically increasing `next_index` counter; the reserved table is shared by all
/// stores. A context name is unique across reserved and user catalogs combined.
///
/// # Index Stability
///
/// Redefining an existing name - moving it between method and statement kind, or changing
/// its pattern - reuses the existing index rather than allocating a new one, so coverage
/// data already tagged with that index remains valid. The `name -> index` indirection
/// table records every allocation for the lifetime of the store.
///
/// # Thread Safety
///
/// The rendered-name cache is a [`DashMap`], safe under concurrent readers while a single
/// writer mutates the catalogs; every catalog mutation clears the cache. Catalog mutation
/// itself requires `&mut self` and follows the registry's single-writer contract.
#[derive(Debug, Clone)]
pub struct ContextStore {
    method_contexts: Vec<MethodRegexpContext>,
    statement_contexts: Vec<StatementRegexpContext>,
    index_by_name: HashMap<String, usize>,
    next_index: usize,
    rendered: DashMap<ContextSet, String>,
}

impl Default for ContextStore {
    fn default() -> Self {
        ContextStore::new()
    }
}

impl ContextStore {
    /// Creates a store containing only the reserved contexts
    #[must_use]
    pub fn new() -> Self {
        ContextStore {
            method_contexts: Vec::new(),
            statement_contexts: Vec::new(),
            index_by_name: HashMap::new(),
            next_index: NEXT_INDEX_START,
            rendered: DashMap::new(),
        }
    }

    /// Returns true if `name` is one of the reserved context names
    #[must_use]
    pub fn is_reserved_name(name: &str) -> bool {
        is_reserved_name(name)
    }

    /// Total number of contexts in this store, reserved plus user-defined
    #[must_use]
    pub fn size(&self) -> usize {
        RESERVED_CONTEXTS.len() + self.method_contexts.len() + self.statement_contexts.len()
    }

    /// The next index that would be allocated for a brand-new name
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// The user-defined method contexts, in registration order
    #[must_use]
    pub fn method_contexts(&self) -> &[MethodRegexpContext] {
        &self.method_contexts
    }

    /// The user-defined statement contexts, in registration order
    #[must_use]
    pub fn statement_contexts(&self) -> &[StatementRegexpContext] {
        &self.statement_contexts
    }

    /// Looks up a user method context by name
    #[must_use]
    pub fn method_context(&self, name: &str) -> Option<&MethodRegexpContext> {
        self.method_contexts.iter().find(|ctx| ctx.name() == name)
    }

    /// Looks up a user statement context by name
    #[must_use]
    pub fn statement_context(&self, name: &str) -> Option<&StatementRegexpContext> {
        self.statement_contexts
            .iter()
            .find(|ctx| ctx.name() == name)
    }

    /// Returns the name of the context occupying `index`, if any.
    ///
    /// Indices left behind by contexts that only existed in superseded sessions resolve
    /// to `None` and render as no name.
    #[must_use]
    pub fn context_name(&self, index: usize) -> Option<&str> {
        if let Some(reserved) = RESERVED_CONTEXTS.get(index) {
            return Some(reserved.name());
        }
        if let Some(ctx) = self.method_contexts.iter().find(|ctx| ctx.index() == index) {
            return Some(ctx.name());
        }
        self.statement_contexts
            .iter()
            .find(|ctx| ctx.index() == index)
            .map(StatementRegexpContext::name)
    }

    /// Registers a user method context, returning its index.
    ///
    /// If a context of either kind already holds this name, that entry is removed and its
    /// index reused; a fresh index is allocated only for an entirely new name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NamedContext`] if the name collides with a reserved
    /// context. The store is left unchanged.
    pub fn add_method_context(&mut self, ctx: MethodRegexpContext) -> Result<usize> {
        let index = self.allocate(ctx.name())?;
        self.method_contexts.push(ctx.with_index(index));
        self.rendered.clear();
        Ok(index)
    }

    /// Registers a user statement context, returning its index.
    ///
    /// Same index-reuse rule as [`ContextStore::add_method_context`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NamedContext`] if the name collides with a reserved
    /// context. The store is left unchanged.
    pub fn add_statement_context(&mut self, ctx: StatementRegexpContext) -> Result<usize> {
        let index = self.allocate(ctx.name())?;
        self.statement_contexts.push(ctx.with_index(index));
        self.rendered.clear();
        Ok(index)
    }

    fn allocate(&mut self, name: &str) -> Result<usize> {
        if is_reserved_name(name) {
            return Err(Error::NamedContext(format!(
                "'{name}' is a reserved context name"
            )));
        }
        if let Some(&index) = self.index_by_name.get(name) {
            // Redefinition: evict the previous holder of either kind, keep its index.
            self.method_contexts.retain(|ctx| ctx.name() != name);
            self.statement_contexts.retain(|ctx| ctx.name() != name);
            return Ok(index);
        }
        let index = self.next_index;
        self.next_index += 1;
        self.index_by_name.insert(name.to_string(), index);
        Ok(index)
    }

    /// Builds a context filter from a spec string.
    ///
    /// `spec` is a comma or whitespace separated list of context names. Each token is
    /// resolved against the reserved block contexts, then the reserved regex contexts,
    /// then user method contexts, then user statement contexts, in that priority order.
    /// Unknown tokens are warned about and ignored, never an error.
    ///
    /// If `invert` is set the whole index range `[0, next_index)` is flipped. Regardless
    /// of input or inversion, bit [`CONTEXT_OFF`] is forced on before returning: you can
    /// never accidentally disable detection of disabled coverage.
    #[must_use]
    pub fn create_context_set_filter(&self, spec: &str, invert: bool) -> ContextSet {
        let mut filter = ContextSet::new();
        for token in spec.split([',', ' ', '\t', '\n']).filter(|t| !t.is_empty()) {
            match self.resolve(token) {
                Some(index) => filter = filter.set(index),
                None => log::warn!("ignoring unknown context '{token}' in filter spec"),
            }
        }
        if invert {
            filter = filter.flip(0, self.next_index);
        }
        filter.set(CONTEXT_OFF)
    }

    fn resolve(&self, token: &str) -> Option<usize> {
        reserved_by_name(token, ContextKind::Block)
            .map(SimpleContext::index)
            .or_else(|| reserved_by_name(token, ContextKind::Method).map(SimpleContext::index))
            .or_else(|| self.method_context(token).map(MethodRegexpContext::index))
            .or_else(|| {
                self.statement_context(token)
                    .map(StatementRegexpContext::index)
            })
    }

    /// Renders the names of the contexts in `set`, joined by `", "`.
    ///
    /// Results are cached by set value; the cache is cleared whenever the catalog
    /// changes. Indices with no catalog entry are skipped.
    #[must_use]
    pub fn get_contexts_as_string(&self, set: &ContextSet) -> String {
        if let Some(cached) = self.rendered.get(set) {
            return cached.clone();
        }
        let mut names = Vec::new();
        let mut bit = set.next_set_bit(0);
        while let Some(index) = bit {
            if let Some(name) = self.context_name(index) {
                names.push(name);
            }
            bit = set.next_set_bit(index + 1);
        }
        let text = names.join(", ");
        self.rendered.insert(set.clone(), text.clone());
        text
    }

    /// Encodes the catalogs and allocation state
    pub(crate) fn write(&self, out: &mut TaggedDataOutput) {
        out.write_u32(self.next_index as u32);
        out.write_u32(self.method_contexts.len() as u32);
        for ctx in &self.method_contexts {
            out.write_u32(ctx.index() as u32);
            out.write_str(ctx.name());
            out.write_str(ctx.pattern());
            out.write_u32(ctx.max_complexity());
            out.write_u32(ctx.max_statements());
            out.write_u32(ctx.max_aggregated_complexity());
            out.write_u32(ctx.max_aggregated_statements());
        }
        out.write_u32(self.statement_contexts.len() as u32);
        for ctx in &self.statement_contexts {
            out.write_u32(ctx.index() as u32);
            out.write_str(ctx.name());
            out.write_str(ctx.pattern());
        }
    }

    /// Decodes a store previously written with [`ContextStore::write`]
    pub(crate) fn read(input: &mut TaggedDataInput<'_>) -> Result<Self> {
        let next_index = input.read_u32()? as usize;
        if next_index < NEXT_INDEX_START {
            return Err(format_error!(
                "context store next_index {next_index} is below the reserved range"
            ));
        }
        let mut store = ContextStore::new();
        store.next_index = next_index;

        let method_count = input.read_u32()? as usize;
        for _ in 0..method_count {
            let index = input.read_u32()? as usize;
            let name = input.read_str()?;
            let pattern = input.read_str()?;
            let max_complexity = input.read_u32()?;
            let max_statements = input.read_u32()?;
            let max_aggregated_complexity = input.read_u32()?;
            let max_aggregated_statements = input.read_u32()?;
            let ctx = MethodRegexpContext::new(&name, &pattern)
                .map_err(|e| format_error!("stored method context '{name}' is invalid: {e}"))?
                .with_limits(
                    max_complexity,
                    max_statements,
                    max_aggregated_complexity,
                    max_aggregated_statements,
                )
                .with_index(index);
            store.index_by_name.insert(name, index);
            store.method_contexts.push(ctx);
        }

        let statement_count = input.read_u32()? as usize;
        for _ in 0..statement_count {
            let index = input.read_u32()? as usize;
            let name = input.read_str()?;
            let pattern = input.read_str()?;
            let ctx = StatementRegexpContext::new(&name, &pattern)
                .map_err(|e| format_error!("stored statement context '{name}' is invalid: {e}"))?
                .with_index(index);
            store.index_by_name.insert(name, index);
            store.statement_contexts.push(ctx);
        }

        Ok(store)
    }
}
