//! Store, merge and resolution behavior through the public API
//!
//! Covers the merge scenarios end to end, persistence across reopen, index
//! self-repair, and readers running alongside a writer.

use journal_abbrev::catalog::persist::{INDEX_FILE, RECORDS_FILE};
use journal_abbrev::{
    CandidateRecord, FieldText, JournalId, JournalStore, MatchStrategy, Resolver, ResolverConfig,
    RewriteConfig, RewritePass, RewriteStatus, StoreError, TrustPolicy,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

fn trust_b_over_a() -> TrustPolicy {
    TrustPolicy::new(["b", "a"])
}

#[test]
fn test_higher_trust_promotes_abbreviation() {
    let store = JournalStore::in_memory(trust_b_over_a());

    let (id, created) = store
        .apply_merge(&CandidateRecord::new("Journal of Examples", "A").with_abbreviation("J. Examp."))
        .unwrap();
    assert!(created);

    let snapshot = store.snapshot();
    let result = Resolver::new(&snapshot, ResolverConfig::default())
        .resolve_default("journal of examples")
        .unwrap();
    assert_eq!(result.journal_id, Some(id));
    assert_eq!(result.strategy, MatchStrategy::ExactNormalized);
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);

    let (same_id, created) = store
        .apply_merge(&CandidateRecord::new("Journal of Examples", "B").with_abbreviation("J. Ex."))
        .unwrap();
    assert_eq!(same_id, id);
    assert!(!created);

    let record = store.get(id).unwrap();
    assert_eq!(record.abbreviation.as_deref(), Some("J. Ex."));
    assert!(record.alternate_abbreviations.contains("J. Examp."));

    // The demoted abbreviation still resolves
    let snapshot = store.snapshot();
    let result = Resolver::new(&snapshot, ResolverConfig::default())
        .resolve_default("J. Examp.")
        .unwrap();
    assert_eq!(result.journal_id, Some(id));
    assert_eq!(result.strategy, MatchStrategy::AliasNormalized);
}

#[test]
fn test_alias_key_merges_into_existing_record() {
    let store = JournalStore::in_memory(trust_b_over_a());

    let (id, _) = store
        .apply_merge(
            &CandidateRecord::new("Intl. J. of Testing", "A")
                .with_alias("International Journal of Testing"),
        )
        .unwrap();
    let (merged, created) = store
        .apply_merge(&CandidateRecord::new("International Journal of Testing", "A"))
        .unwrap();

    assert_eq!(merged, id);
    assert!(!created);
    assert_eq!(store.all_records().len(), 1);
}

#[test]
fn test_ambiguous_candidate_is_rejected_without_mutation() {
    let store = JournalStore::in_memory(trust_b_over_a());
    let (r1, _) = store
        .apply_merge(&CandidateRecord::new("Proceedings of X", "A"))
        .unwrap();
    let (r2, _) = store
        .apply_merge(&CandidateRecord::new("Proc. X Conference", "A"))
        .unwrap();
    let before_r1 = store.get(r1).unwrap();
    let before_r2 = store.get(r2).unwrap();
    let generation = store.stats().generation;

    let result = store.apply_merge(
        &CandidateRecord::new("Proceedings of X", "B").with_alias("Proc. X Conference"),
    );

    match result {
        Err(StoreError::Conflict(conflict)) => {
            let ids: Vec<JournalId> = conflict.matches.iter().map(|(id, _)| *id).collect();
            assert_eq!(ids, vec![r1, r2]);
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(store.get(r1).unwrap(), before_r1);
    assert_eq!(store.get(r2).unwrap(), before_r2);
    assert_eq!(store.stats().generation, generation);
}

#[test]
fn test_import_counts_outcomes() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    let candidates = vec![
        CandidateRecord::new("Journal of Examples", "registry").with_abbreviation("J. Examp."),
        CandidateRecord::new("journal of examples", "user"),
        CandidateRecord::new("Annals of Testing", "scraped"),
        CandidateRecord::new("Annals of Testing", "registry").with_alias("Ann. Test."),
        CandidateRecord::new("Journal of Examples", "user").with_alias("Annals of Testing"),
        CandidateRecord::new("   ", "user"),
    ];

    let summary = store.import(candidates).unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.warnings.len(), 2);
    assert_eq!(summary.total(), 6);
    assert!(store.verify_index().is_ok());
}

#[test]
fn test_reopen_preserves_records_and_ids() {
    let dir = TempDir::new().unwrap();

    let (jcp, removed) = {
        let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
        let (jcp, _) = store
            .apply_merge(
                &CandidateRecord::new("The Journal of Chemical Physics", "registry")
                    .with_abbreviation("J. Chem. Phys.")
                    .with_coden("JCPSA"),
            )
            .unwrap();
        let (removed, _) = store
            .apply_merge(&CandidateRecord::new("Annals of Testing", "user"))
            .unwrap();
        store.remove(removed).unwrap();
        store.close().unwrap();
        (jcp, removed)
    };

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    let record = store.get(jcp).unwrap();
    assert_eq!(record.abbreviation.as_deref(), Some("J. Chem. Phys."));
    assert_eq!(record.coden.as_deref(), Some("JCPSA"));
    assert!(matches!(store.get(removed), Err(StoreError::NotFound(_))));
    assert_eq!(
        store.lookup_by_name("journal of chemical physics").unwrap().id,
        jcp
    );

    // Removed ids are never handed out again
    let (fresh, created) = store
        .apply_merge(&CandidateRecord::new("Annals of Testing", "user"))
        .unwrap();
    assert!(created);
    assert_ne!(fresh, removed);
    assert!(fresh > removed);
}

/// Put a non-empty directory where a store file belongs, so writing it fails
fn block_path(path: &Path) {
    if path.is_file() {
        std::fs::remove_file(path).unwrap();
    }
    std::fs::create_dir(path).unwrap();
    std::fs::write(path.join("occupied"), b"x").unwrap();
}

#[test]
fn test_failed_records_write_commits_nothing() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join(RECORDS_FILE);
    let saved = dir.path().join("journals.saved");

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    let (kept, _) = store
        .apply_merge(&CandidateRecord::new("Journal of Examples", "user"))
        .unwrap();
    let generation = store.stats().generation;

    std::fs::rename(&records, &saved).unwrap();
    block_path(&records);

    let result = store.apply_merge(&CandidateRecord::new("Annals of Testing", "user"));
    assert!(matches!(result, Err(StoreError::Io(_))), "got {result:?}");
    assert!(store.lookup_by_name("Annals of Testing").is_err());
    assert_eq!(store.stats().generation, generation);
    assert_eq!(store.stats().records, 1);

    std::fs::remove_dir_all(&records).unwrap();
    std::fs::rename(&saved, &records).unwrap();
    store.close().unwrap();

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    assert_eq!(store.stats().records, 1);
    assert!(store.get(kept).is_ok());
    assert!(store.lookup_by_name("Annals of Testing").is_err());

    // The same write succeeds once the file is writable again
    let (added, created) = store
        .apply_merge(&CandidateRecord::new("Annals of Testing", "user"))
        .unwrap();
    assert!(created);
    assert!(added > kept);
}

#[test]
fn test_failed_index_write_keeps_committed_records() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join(INDEX_FILE);

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    block_path(&index);

    let (id, created) = store
        .apply_merge(&CandidateRecord::new("Journal of Examples", "user"))
        .unwrap();
    assert!(created);
    assert!(store.close().is_err());

    std::fs::remove_dir_all(&index).unwrap();
    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    assert_eq!(store.lookup_by_name("Journal of Examples").unwrap().id, id);
    assert!(store.verify_index().is_ok());
    assert!(index.is_file());
}

#[test]
fn test_missing_index_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
        store
            .apply_merge(&CandidateRecord::new("Journal of Examples", "user").with_alias("J of Ex"))
            .unwrap();
        store.close().unwrap();
    }

    std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    assert!(dir.path().join(INDEX_FILE).exists());
    assert!(store.verify_index().is_ok());
    assert!(store.lookup_by_name("J of Ex").is_ok());
}

#[test]
fn test_corrupt_index_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
        store
            .apply_merge(&CandidateRecord::new("Journal of Examples", "user"))
            .unwrap();
    }

    std::fs::write(dir.path().join(INDEX_FILE), b"\xff\xfe not an index").unwrap();

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    assert!(store.verify_index().is_ok());
    assert_eq!(store.stats().records, 1);
    assert!(store.lookup_by_name("Journal of Examples").is_ok());
}

#[test]
fn test_corrupt_records_fail_to_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(RECORDS_FILE), b"garbage").unwrap();

    assert!(JournalStore::open(dir.path(), TrustPolicy::default()).is_err());
}

#[test]
fn test_every_name_key_owned_by_one_record() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    let names = [
        "Journal of Examples",
        "Annals of Testing",
        "The Journal of Chemical Physics",
        "Physical Review Letters",
        "Journal of Examples", // duplicate by key
        "JOURNAL OF EXAMPLES.",
    ];
    for name in names {
        store.apply_merge(&CandidateRecord::new(name, "user")).unwrap();
    }

    let records = store.all_records();
    assert_eq!(records.len(), 4);

    let mut seen = HashSet::new();
    for record in &records {
        for name_key in &record.name_keys {
            assert!(
                seen.insert(name_key.key.clone()),
                "key '{}' owned twice",
                name_key.key
            );
        }
    }
}

#[test]
fn test_all_records_is_restartable() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    for name in ["Journal of Examples", "Annals of Testing"] {
        store.apply_merge(&CandidateRecord::new(name, "user")).unwrap();
    }

    let records = store.all_records();
    let first: Vec<JournalId> = records.iter().map(|r| r.id).collect();
    let second: Vec<JournalId> = records.iter().map(|r| r.id).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_fuzzy_resolution_of_misspelling() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    let (id, _) = store
        .apply_merge(&CandidateRecord::new("Journal of Examples", "user"))
        .unwrap();

    let snapshot = store.snapshot();
    let resolver = Resolver::new(&snapshot, ResolverConfig::default());

    let result = resolver.resolve("Jounral of Examples", 0.5).unwrap();
    assert_eq!(result.journal_id, Some(id));
    assert_eq!(result.strategy, MatchStrategy::Fuzzy);
    assert!(result.confidence < 1.0);

    let miss = resolver.resolve("Zoology Quarterly", 0.5).unwrap();
    assert_eq!(miss.journal_id, None);
    assert_eq!(miss.strategy, MatchStrategy::FuzzyBelowThreshold);
}

#[test]
fn test_rewrite_against_store_snapshot() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    store
        .apply_merge(
            &CandidateRecord::new("The Journal of Chemical Physics", "registry")
                .with_abbreviation("J. Chem. Phys."),
        )
        .unwrap();

    let snapshot = store.snapshot();
    let pass = RewritePass::new(
        Resolver::new(&snapshot, ResolverConfig::default()),
        RewriteConfig::default(),
    );

    // Writes after the snapshot do not affect the running pass
    store
        .apply_merge(&CandidateRecord::new("Annals of Testing", "user").with_abbreviation("Ann. Test."))
        .unwrap();

    let fields = vec![
        FieldText::new("smith2020", "{The Journal of Chemical Physics}"),
        FieldText::new("jones2021", "Annals of Testing"),
    ];
    let report = pass.run(fields, &AtomicBool::new(false)).unwrap();

    assert_eq!(report.outcomes[0].text, "{J. Chem. Phys.}");
    assert_eq!(report.outcomes[0].status, RewriteStatus::Rewritten);
    assert_eq!(report.outcomes[1].status, RewriteStatus::Unresolved);
    assert_eq!(report.summary.unresolved_entries, vec!["jones2021".to_string()]);
}

#[test]
fn test_shared_abbreviation_round_trips() {
    let store = JournalStore::in_memory(TrustPolicy::default());
    let summary = store
        .import(vec![
            CandidateRecord::new("Journal of Physics", "registry").with_abbreviation("J. Phys."),
            CandidateRecord::new("Journal de Physique", "registry").with_abbreviation("J. Phys."),
        ])
        .unwrap();
    assert_eq!(summary.added, 2);

    let snapshot = store.snapshot();
    let physique = store.lookup_by_name("Journal de Physique").unwrap();
    assert_eq!(physique.abbreviation, None);
    assert!(physique.alternate_abbreviations.contains("J. Phys."));

    let resolver = Resolver::new(&snapshot, ResolverConfig::default());
    for record in snapshot.records() {
        let Some(abbreviation) = &record.abbreviation else {
            continue;
        };
        let result = resolver.resolve_default(abbreviation).unwrap();
        assert_eq!(result.journal_id, Some(record.id), "{abbreviation}");
    }

    let pass = RewritePass::new(resolver, RewriteConfig::default());
    let first = pass
        .run(
            vec![
                FieldText::new("a", "Journal of Physics"),
                FieldText::new("b", "Journal de Physique"),
            ],
            &AtomicBool::new(false),
        )
        .unwrap();
    assert_eq!(first.outcomes[0].text, "J. Phys.");
    assert_eq!(first.outcomes[1].status, RewriteStatus::NoAbbreviation);

    let again = pass
        .run(
            first
                .outcomes
                .iter()
                .map(|o| FieldText::new(o.entry_id.clone(), o.text.clone())),
            &AtomicBool::new(false),
        )
        .unwrap();
    for (before, after) in first.outcomes.iter().zip(&again.outcomes) {
        assert_eq!(before.text, after.text);
    }
    assert_eq!(again.outcomes[0].status, RewriteStatus::Unchanged);
}

#[test]
fn test_concurrent_writers_of_one_candidate_create_one_record() {
    let dir = TempDir::new().unwrap();
    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    let candidate = CandidateRecord::new("Journal of Examples", "user").with_abbreviation("J. Examp.");

    let results: Vec<(JournalId, bool)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(|| store.apply_merge(&candidate).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0].0, results[1].0);
    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    assert_eq!(store.stats().records, 1);
    assert_eq!(store.stats().generation, 1);
    store.close().unwrap();

    let store = JournalStore::open(dir.path(), TrustPolicy::default()).unwrap();
    assert_eq!(store.stats().records, 1);
    assert_eq!(store.stats().generation, 1);
}

#[test]
fn test_concurrent_writers_bump_generation_once_per_write() {
    let store = JournalStore::in_memory(TrustPolicy::default());

    std::thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..25 {
                    let name = format!("Journal of Topic {t}-{i}");
                    store.apply_merge(&CandidateRecord::new(name.clone(), "user")).unwrap();
                    // Repeats change nothing
                    store.apply_merge(&CandidateRecord::new(name, "user")).unwrap();
                }
            });
        }
    });

    assert_eq!(store.stats().records, 100);
    assert_eq!(store.stats().generation, 100);
    assert!(store.verify_index().is_ok());
}

#[test]
fn test_readers_never_see_partial_writes() {
    let store = JournalStore::in_memory(TrustPolicy::default());

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..200 {
                store
                    .apply_merge(
                        &CandidateRecord::new(format!("Journal of Topic {i}"), "user")
                            .with_abbreviation(format!("J. Top. {i}")),
                    )
                    .unwrap();
            }
        });

        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let snapshot = store.snapshot();
                    assert!(snapshot.verify_index().is_ok());
                    for record in snapshot.records() {
                        let key = record.full_name_key().unwrap();
                        assert_eq!(snapshot.lookup_name_key(key), Some(record.id));
                    }
                }
            });
        }
    });

    assert_eq!(store.stats().records, 200);
}
