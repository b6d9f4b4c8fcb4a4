//! Cross-database context merge.
//!
//! Combining independently instrumented coverage databases means their context indices
//! share no meaning: each database allocated user indices in its own order. The merge
//! keeps only *universal* contexts - user contexts present, in syntactically equivalent
//! form, in every source - re-adds them to the target registry's store, and hands back a
//! [`ContextMapper`] that rewrites each source's element tree into the merged index
//! universe.
//!
//! Source order is deterministic: sources are sorted by database identifier before basis
//! selection and comparison, so the merged outcome never depends on collection iteration
//! order.
//!
//! # Failure Policy
//!
//! Re-adding a single universal context can fail on a stale duplicate; such contexts are
//! logged and skipped and the merge completes with whatever contexts succeeded. Partial
//! success is expected.

use std::collections::HashMap;

use crate::context::named::{
    ContextKind, MethodRegexpContext, StatementRegexpContext, NEXT_INDEX_START,
};
use crate::context::store::ContextStore;
use crate::registry::model::FileInfo;
use crate::registry::CoverageRegistry;
use crate::{Error, Result};

/// One source database participating in a merge: a stable identifier plus its context
/// store. The identifier keys the mapping tables and orders the merge deterministically.
#[derive(Debug, Clone, Copy)]
pub struct MergeSource<'a> {
    /// Stable database identifier, typically the registry path or name
    pub id: &'a str,
    /// The source database's context store
    pub store: &'a ContextStore,
}

/// Per-source index remapping produced by [`merge_context_stores`].
///
/// For every source database the mapper records an `old index -> merged index` table
/// covering the reserved range (identity) and every universal user context. Applying the
/// mapping to a file tree rewrites each element's context set; bits for non-universal
/// contexts have no table entry and are dropped by the remap.
#[derive(Debug, Default)]
pub struct ContextMapper {
    mappings: HashMap<String, HashMap<usize, usize>>,
}

impl ContextMapper {
    /// The recorded mapping for database `id`, if it participated in the merge
    #[must_use]
    pub fn mapping(&self, id: &str) -> Option<&HashMap<usize, usize>> {
        self.mappings.get(id)
    }

    /// Rewrites every element context set in `file` from database `id`'s index universe
    /// into the merged one.
    ///
    /// Walks the file's classes, methods, statements and branches; the element kinds are
    /// a closed set, so this is a plain traversal rather than dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NamedContext`] if `id` was not a source of this merge.
    pub fn apply_context_mapping(&self, id: &str, file: &mut FileInfo) -> Result<()> {
        let Some(mapping) = self.mappings.get(id) else {
            return Err(Error::NamedContext(format!(
                "no context mapping recorded for database '{id}'"
            )));
        };
        for class in &mut file.classes {
            for method in &mut class.methods {
                method.context = method.context.remap(mapping);
                for statement in &mut method.statements {
                    statement.context = statement.context.remap(mapping);
                }
                for branch in &mut method.branches {
                    branch.context = branch.context.remap(mapping);
                }
            }
        }
        Ok(())
    }
}

/// One of the basis store's user contexts, of either kind.
enum BasisContext<'a> {
    Method(&'a MethodRegexpContext),
    Statement(&'a StatementRegexpContext),
}

impl<'a> BasisContext<'a> {
    fn index(&self) -> usize {
        match self {
            BasisContext::Method(ctx) => ctx.index(),
            BasisContext::Statement(ctx) => ctx.index(),
        }
    }

    fn kind(&self) -> ContextKind {
        match self {
            BasisContext::Method(_) => ContextKind::Method,
            BasisContext::Statement(_) => ContextKind::Statement,
        }
    }

    fn name(&self) -> &'a str {
        match self {
            BasisContext::Method(ctx) => ctx.name(),
            BasisContext::Statement(ctx) => ctx.name(),
        }
    }

    fn pattern(&self) -> &'a str {
        match self {
            BasisContext::Method(ctx) => ctx.pattern(),
            BasisContext::Statement(ctx) => ctx.pattern(),
        }
    }
}

/// Merges the context stores of `sources` into `target`'s store.
///
/// The source with the fewest total contexts is the *basis*: any surviving custom
/// context must exist, in equivalent form, in every source, so starting from the
/// smallest minimizes comparisons. Equivalence is syntactic - same kind, identical
/// pattern string - and the basis context's name and thresholds are the ones that
/// survive. Universal contexts are re-added in the basis's allocation order, both
/// kinds interleaved, so a self-merge maps every index to itself. Reserved contexts
/// map identity without comparison.
///
/// The target is marked read-only: a merged registry rejects further instrumentation
/// updates, while merge assembly through [`CoverageRegistry::add_file`] stays open.
pub fn merge_context_stores(
    target: &mut CoverageRegistry,
    sources: &[MergeSource<'_>],
) -> ContextMapper {
    let mut mapper = ContextMapper::default();
    if sources.is_empty() {
        return mapper;
    }

    let mut ordered: Vec<&MergeSource<'_>> = sources.iter().collect();
    ordered.sort_by_key(|source| source.id);

    let Some(basis) = ordered
        .iter()
        .min_by_key(|source| source.store.size())
        .copied()
        .copied()
    else {
        return mapper;
    };

    // Reserved indices keep their meaning in every store, merged one included.
    for source in &ordered {
        let identity = (0..NEXT_INDEX_START).map(|i| (i, i)).collect();
        mapper.mappings.insert(source.id.to_string(), identity);
    }

    let mut candidates: Vec<BasisContext<'_>> = basis
        .store
        .method_contexts()
        .iter()
        .map(BasisContext::Method)
        .chain(
            basis
                .store
                .statement_contexts()
                .iter()
                .map(BasisContext::Statement),
        )
        .collect();
    candidates.sort_by_key(BasisContext::index);

    for candidate in candidates {
        let kind = candidate.kind();
        let pattern = candidate.pattern();
        let name = candidate.name();
        if !is_universal(&ordered, kind, pattern) {
            continue;
        }
        let added = match candidate {
            BasisContext::Method(ctx) => target.context_store_mut().add_method_context(ctx.clone()),
            BasisContext::Statement(ctx) => {
                target.context_store_mut().add_statement_context(ctx.clone())
            }
        };
        match added {
            Ok(merged_index) => {
                record(&mut mapper, &ordered, kind, pattern, merged_index);
            }
            Err(e) => {
                log::warn!("skipping context '{name}' during merge: {e}");
            }
        }
    }

    target.mark_read_only();
    mapper
}

fn is_universal(sources: &[&MergeSource<'_>], kind: ContextKind, pattern: &str) -> bool {
    sources
        .iter()
        .all(|source| !equivalent_indices(source.store, kind, pattern).is_empty())
}

fn record(
    mapper: &mut ContextMapper,
    sources: &[&MergeSource<'_>],
    kind: ContextKind,
    pattern: &str,
    merged_index: usize,
) {
    for source in sources {
        let Some(mapping) = mapper.mappings.get_mut(source.id) else {
            continue;
        };
        // A source may hold the same pattern under several names; every occurrence
        // gets an entry so no coverage bits are dropped. First mapping wins.
        for old_index in equivalent_indices(source.store, kind, pattern) {
            mapping.entry(old_index).or_insert(merged_index);
        }
    }
}

fn equivalent_indices(store: &ContextStore, kind: ContextKind, pattern: &str) -> Vec<usize> {
    match kind {
        ContextKind::Method => store
            .method_contexts()
            .iter()
            .filter(|ctx| ctx.pattern() == pattern)
            .map(MethodRegexpContext::index)
            .collect(),
        ContextKind::Statement => store
            .statement_contexts()
            .iter()
            .filter(|ctx| ctx.pattern() == pattern)
            .map(StatementRegexpContext::index)
            .collect(),
        ContextKind::Block => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::named::{CONTEXT_STATIC, CONTEXT_TRY};
    use crate::context::set::ContextSet;
    use crate::registry::model::{ClassInfo, MethodInfo, SourceRegion, StatementInfo};
    use std::path::Path;

    fn store_with(method: &[(&str, &str)], statement: &[(&str, &str)]) -> ContextStore {
        let mut store = ContextStore::new();
        for (name, pattern) in method {
            store
                .add_method_context(MethodRegexpContext::new(name, pattern).unwrap())
                .unwrap();
        }
        for (name, pattern) in statement {
            store
                .add_statement_context(StatementRegexpContext::new(name, pattern).unwrap())
                .unwrap();
        }
        store
    }

    fn target() -> CoverageRegistry {
        CoverageRegistry::new(Path::new("merged.db"), "merged")
    }

    #[test]
    fn test_self_merge_is_identity() {
        let store = store_with(&[("getters", ".*get.*")], &[("logging", "log\\..*")]);
        let mut merged = target();
        let sources = [
            MergeSource { id: "a", store: &store },
            MergeSource { id: "b", store: &store },
        ];
        let mapper = merge_context_stores(&mut merged, &sources);

        assert_eq!(merged.context_store().method_contexts().len(), 1);
        assert_eq!(merged.context_store().statement_contexts().len(), 1);
        for id in ["a", "b"] {
            let mapping = mapper.mapping(id).unwrap();
            for (old, new) in mapping {
                assert_eq!(old, new);
            }
        }
    }

    #[test]
    fn test_self_merge_identity_with_interleaved_kinds() {
        // The statement context was allocated before the method context, so the
        // allocation order runs against the kind order
        let mut store = ContextStore::new();
        let logging = store
            .add_statement_context(StatementRegexpContext::new("logging", "log\\..*").unwrap())
            .unwrap();
        let getters = store
            .add_method_context(MethodRegexpContext::new("getters", ".*get.*").unwrap())
            .unwrap();
        assert_eq!(logging, NEXT_INDEX_START);
        assert_eq!(getters, NEXT_INDEX_START + 1);

        let mut merged = target();
        let sources = [MergeSource { id: "a", store: &store }];
        let mapper = merge_context_stores(&mut merged, &sources);

        let mapping = mapper.mapping("a").unwrap();
        assert_eq!(mapping.get(&logging), Some(&logging));
        assert_eq!(mapping.get(&getters), Some(&getters));
        // The merged store keeps each context at its original index and kind
        assert_eq!(
            merged.context_store().statement_context("logging").unwrap().index(),
            logging
        );
        assert_eq!(
            merged.context_store().method_context("getters").unwrap().index(),
            getters
        );
    }

    #[test]
    fn test_duplicate_pattern_maps_every_occurrence() {
        // Source "b" holds the same pattern under two names; neither occurrence's
        // coverage bits may be dropped by the remap
        let a = store_with(&[("getters", ".*get.*")], &[]);
        let b = store_with(&[("getters", ".*get.*"), ("accessors", ".*get.*")], &[]);
        let mut merged = target();
        let sources = [
            MergeSource { id: "a", store: &a },
            MergeSource { id: "b", store: &b },
        ];
        let mapper = merge_context_stores(&mut merged, &sources);

        let merged_index = merged.context_store().method_context("getters").unwrap().index();
        let b_mapping = mapper.mapping("b").unwrap();
        let first = b.method_context("getters").unwrap().index();
        let second = b.method_context("accessors").unwrap().index();
        assert_eq!(b_mapping.get(&first), Some(&merged_index));
        assert_eq!(b_mapping.get(&second), Some(&merged_index));
    }

    #[test]
    fn test_non_universal_context_dropped() {
        let a = store_with(&[("getters", ".*get.*")], &[("only_in_a", "a.*")]);
        let b = store_with(&[("getters", ".*get.*")], &[]);
        let mut merged = target();
        let sources = [
            MergeSource { id: "a", store: &a },
            MergeSource { id: "b", store: &b },
        ];
        let mapper = merge_context_stores(&mut merged, &sources);

        assert!(merged.context_store().method_context("getters").is_some());
        assert!(merged.context_store().statement_context("only_in_a").is_none());
        // The dropped context has no mapping entry for its old index
        let a_mapping = mapper.mapping("a").unwrap();
        let only_in_a = a.statement_context("only_in_a").unwrap().index();
        assert!(!a_mapping.contains_key(&only_in_a));
    }

    #[test]
    fn test_equivalence_is_by_pattern_not_name() {
        // Same pattern registered under different names in the two sources
        let a = store_with(&[("accessors", ".*get.*")], &[]);
        let b = store_with(&[("getters", ".*get.*")], &[]);
        let mut merged = target();
        let sources = [
            MergeSource { id: "a", store: &a },
            MergeSource { id: "b", store: &b },
        ];
        let mapper = merge_context_stores(&mut merged, &sources);

        // Basis is the lexically first of the equally sized stores
        let survivor = merged.context_store().method_contexts();
        assert_eq!(survivor.len(), 1);
        assert_eq!(survivor[0].name(), "accessors");
        let merged_index = survivor[0].index();
        assert_eq!(
            mapper.mapping("a").unwrap()[&a.method_context("accessors").unwrap().index()],
            merged_index
        );
        assert_eq!(
            mapper.mapping("b").unwrap()[&b.method_context("getters").unwrap().index()],
            merged_index
        );
    }

    #[test]
    fn test_smallest_store_is_basis() {
        let big = store_with(&[("one", "1.*"), ("two", "2.*"), ("shared", "s.*")], &[]);
        let small = store_with(&[("shared", "s.*")], &[]);
        let mut merged = target();
        let sources = [
            MergeSource { id: "big", store: &big },
            MergeSource { id: "small", store: &small },
        ];
        merge_context_stores(&mut merged, &sources);
        // Only the basis's (small's) contexts were candidates
        assert_eq!(merged.context_store().method_contexts().len(), 1);
        assert!(merged.context_store().method_context("shared").is_some());
    }

    #[test]
    fn test_merged_registry_is_read_only() {
        let store = ContextStore::new();
        let mut merged = target();
        let sources = [MergeSource { id: "a", store: &store }];
        merge_context_stores(&mut merged, &sources);
        assert!(merged.is_read_only());
    }

    #[test]
    fn test_apply_context_mapping_rewrites_tree() {
        let a = store_with(&[("getters", ".*get.*")], &[("logging", "log\\..*")]);
        let b = store_with(&[("logging2", "log\\..*")], &[("getters2", ".*get.*")]);
        // a: getters -> 19 (method), logging -> 20 (statement)
        // b: logging2 -> 19 (method!), getters2 -> 20; kinds differ so neither is
        // universal against a's entries of the same pattern
        let mut merged = target();
        let sources = [
            MergeSource { id: "a", store: &a },
            MergeSource { id: "b", store: &b },
        ];
        let mapper = merge_context_stores(&mut merged, &sources);
        assert!(merged.context_store().method_contexts().is_empty());
        assert!(merged.context_store().statement_contexts().is_empty());

        let mut file = crate::registry::model::FileInfo {
            name: "A.java".to_string(),
            encoding: None,
            timestamp: 0,
            filesize: 0,
            checksum: 0,
            data_index: 0,
            data_length: 1,
            classes: vec![ClassInfo {
                name: "A".to_string(),
                region: SourceRegion::default(),
                methods: vec![MethodInfo {
                    signature: "void a()".to_string(),
                    region: SourceRegion::default(),
                    context: ContextSet::new().set(CONTEXT_STATIC).set(19),
                    complexity: 1,
                    statements: vec![StatementInfo {
                        region: SourceRegion::default(),
                        context: ContextSet::new().set(CONTEXT_TRY).set(20),
                        complexity: 1,
                    }],
                    branches: Vec::new(),
                }],
            }],
            supported_versions: vec![1],
        };
        mapper.apply_context_mapping("a", &mut file).unwrap();

        let method = &file.classes[0].methods[0];
        // Reserved bits survive identity mapping, dropped user bits disappear
        assert_eq!(method.context, ContextSet::new().set(CONTEXT_STATIC));
        assert_eq!(
            method.statements[0].context,
            ContextSet::new().set(CONTEXT_TRY)
        );
    }

    #[test]
    fn test_apply_context_mapping_unknown_db() {
        let store = ContextStore::new();
        let mut merged = target();
        let sources = [MergeSource { id: "a", store: &store }];
        let mapper = merge_context_stores(&mut merged, &sources);
        let mut file = FileInfo {
            name: "A.java".to_string(),
            encoding: None,
            timestamp: 0,
            filesize: 0,
            checksum: 0,
            data_index: 0,
            data_length: 0,
            classes: Vec::new(),
            supported_versions: Vec::new(),
        };
        let err = mapper.apply_context_mapping("zzz", &mut file).unwrap_err();
        assert!(matches!(err, Error::NamedContext(_)));
    }

    #[test]
    fn test_empty_sources() {
        let mut merged = target();
        let mapper = merge_context_stores(&mut merged, &[]);
        assert!(mapper.mapping("a").is_none());
        assert!(!merged.is_read_only());
    }
}
