//! Integration tests for the cross-database context merge.
//!
//! These tests drive the full merge flow: build two independently instrumented
//! registries, merge their context stores into a fresh target, remap each source's file
//! tree, and persist and reload the merged result.

use covreg::context::{CONTEXT_OFF, CONTEXT_STATIC, CONTEXT_TRY};
use covreg::prelude::*;

fn instrumented_registry(
    dir: &std::path::Path,
    file_name: &str,
    db_name: &str,
    statement_contexts: &[(&str, &str)],
) -> Result<CoverageRegistry> {
    let mut store = ContextStore::new();
    let mut indices = Vec::new();
    for (name, pattern) in statement_contexts {
        indices.push(store.add_statement_context(StatementRegexpContext::new(name, pattern)?)?);
    }

    // Tag the method with the first user context plus a couple of reserved ones
    let mut context = ContextSet::new().set(CONTEXT_STATIC).set(CONTEXT_TRY);
    if let Some(&first) = indices.first() {
        context = context.set(first);
    }

    let file = FileInfo {
        name: file_name.to_string(),
        encoding: None,
        timestamp: 1_700_000_000_000,
        filesize: 100,
        checksum: 7,
        data_index: 0,
        data_length: 2,
        classes: vec![ClassInfo {
            name: file_name.trim_end_matches(".java").to_string(),
            region: SourceRegion::default(),
            methods: vec![MethodInfo {
                signature: "void run()".to_string(),
                region: SourceRegion::default(),
                context,
                complexity: 1,
                statements: Vec::new(),
                branches: Vec::new(),
            }],
        }],
        supported_versions: Vec::new(),
    };

    let path = dir.join(format!("{db_name}.db"));
    let mut registry = CoverageRegistry::create_or_load(&path, db_name)?;
    registry.apply_update(
        0,
        RegistryUpdate::Full(FullProjectUpdate {
            version: 1,
            start_ts: 1,
            end_ts: 2,
            slot_count: 2,
            files: vec![file],
            context_store: store,
        }),
    )?;
    registry.save_and_append()?;
    Ok(registry)
}

#[test]
fn merge_two_databases_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;

    // "logging" is shared by both databases; "only_a" exists in just one
    let a = instrumented_registry(
        dir.path(),
        "Alpha.java",
        "a",
        &[("logging", "log\\..*"), ("only_a", "a\\..*")],
    )?;
    let b = instrumented_registry(dir.path(), "Beta.java", "b", &[("logging", "log\\..*")])?;

    let merged_path = dir.path().join("merged.db");
    let mut merged = CoverageRegistry::new(&merged_path, "merged");
    let sources = [
        MergeSource { id: "a", store: a.context_store() },
        MergeSource { id: "b", store: b.context_store() },
    ];
    let mapper = merge_context_stores(&mut merged, &sources);

    // Only the universal context survives
    assert!(merged.context_store().statement_context("logging").is_some());
    assert!(merged.context_store().statement_context("only_a").is_none());
    assert!(merged.is_read_only());

    // Remap each source's file tree into the merged universe and assemble the target
    for (id, source) in [("a", &a), ("b", &b)] {
        for file in &source.project().files {
            let mut remapped = file.clone();
            mapper.apply_context_mapping(id, &mut remapped)?;
            merged.add_file(remapped);
        }
    }
    merged.save_and_overwrite()?;

    let reloaded = CoverageRegistry::from_file(&merged_path)?.expect("merged registry on disk");
    assert_eq!(reloaded.project().files.len(), 2);

    let merged_logging = reloaded
        .context_store()
        .statement_context("logging")
        .expect("merged context present")
        .index();
    let alpha = reloaded.project().file("Alpha.java").expect("alpha merged");
    let method_context = &alpha.classes[0].methods[0].context;
    // Reserved bits mapped identity, "logging" moved to its merged index, "only_a" gone
    assert!(method_context.get(CONTEXT_STATIC));
    assert!(method_context.get(CONTEXT_TRY));
    assert!(method_context.get(merged_logging));
    let names = reloaded.context_store().get_contexts_as_string(method_context);
    assert_eq!(names, "static, try, logging");
    Ok(())
}

#[test]
fn merged_registry_rejects_instrumentation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = instrumented_registry(dir.path(), "Alpha.java", "a", &[])?;

    let mut merged = CoverageRegistry::new(&dir.path().join("merged.db"), "merged");
    let sources = [MergeSource { id: "a", store: a.context_store() }];
    merge_context_stores(&mut merged, &sources);

    let err = merged
        .apply_update(
            0,
            RegistryUpdate::Empty(EmptyProjectUpdate {
                version: 5,
                start_ts: 0,
                end_ts: 0,
            }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnlyRegistry));
    Ok(())
}

#[test]
fn merge_filter_still_forces_off_bit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = instrumented_registry(dir.path(), "Alpha.java", "a", &[("logging", "log\\..*")])?;
    let b = instrumented_registry(dir.path(), "Beta.java", "b", &[("logging", "log\\..*")])?;

    let mut merged = CoverageRegistry::new(&dir.path().join("merged.db"), "merged");
    let sources = [
        MergeSource { id: "a", store: a.context_store() },
        MergeSource { id: "b", store: b.context_store() },
    ];
    merge_context_stores(&mut merged, &sources);

    let filter = merged
        .context_store()
        .create_context_set_filter("logging", true);
    assert!(filter.get(CONTEXT_OFF));
    Ok(())
}
