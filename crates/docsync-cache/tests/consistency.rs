//! Consistency contract of the document cache against a real directory

use docsync_cache::{CacheConfig, CacheError, DocumentCache, FlushPhase};
use docsync_model::{Body, DocKey, LineStatus, Mutation, Stamp};
use docsync_test_utils::{key, FailingStore, GatedStore, TempStore, SAMPLE_MIXED, SAMPLE_TODAY};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn cache_over(store: &TempStore) -> DocumentCache {
    DocumentCache::new(store.file_store(), CacheConfig::default())
}

fn stamp(raw: &str) -> Stamp {
    Stamp::parse(raw).unwrap()
}

#[tokio::test]
async fn chained_applies_equal_sequential_application() {
    let store = TempStore::with_file("today.md", SAMPLE_MIXED);
    let cache = cache_over(&store);
    let key = key("today.md");

    let mutations = vec![
        Mutation::AppendTask { text: "water plants".into() },
        Mutation::Complete { line: 2, at: stamp("2025-02-03") },
        Mutation::EditText { line: 6, text: "water all plants".into() },
        Mutation::Reopen { line: 2 },
        Mutation::AppendRaw { line: "## Later".into() },
    ];

    let mut expected: Body = cache.get(&key).await.unwrap().body().clone();
    let mut version = 0;
    for mutation in &mutations {
        mutation.apply(&mut expected).unwrap();
        version = cache.apply(&key, mutation.clone(), version).await.unwrap();
    }

    let doc = cache.get(&key).await.unwrap();
    assert_eq!(doc.version(), mutations.len() as u64);
    assert_eq!(doc.body(), &expected);
    assert!(doc.is_dirty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_applies_with_same_version_have_one_winner() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");
    let base = cache.get(&key).await.unwrap().version();

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .apply(&key, Mutation::AppendTask { text: format!("task {n}") }, base)
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, base + 1);
                wins += 1;
            }
            Err(e) => {
                assert!(e.is_conflict(), "unexpected error: {e}");
                conflicts += 1;
            }
        }
    }
    assert_eq!((wins, conflicts), (1, 7));
    assert_eq!(cache.stats().conflicts, 7);
}

#[tokio::test]
async fn flushed_content_round_trips_through_a_fresh_cache() {
    let store = TempStore::with_file("today.md", SAMPLE_MIXED);
    let key = key("today.md");

    let cache = cache_over(&store);
    let v = cache
        .apply(&key, Mutation::Complete { line: 2, at: stamp("2025-02-03") }, 0)
        .await
        .unwrap();
    cache
        .apply(&key, Mutation::AppendTask { text: "send invoice".into() }, v)
        .await
        .unwrap();
    cache.flush(&key).await.unwrap();
    let flushed = cache.get(&key).await.unwrap();
    assert!(!flushed.is_dirty());

    let fresh = cache_over(&store);
    let reloaded = fresh.get(&key).await.unwrap();
    assert_eq!(reloaded.body(), flushed.body());
    assert!(store.read("today.md").starts_with("# Today\n\n- [x] buy milk (2025-02-03)\n"));
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict_without_mutation() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    for n in 0..5 {
        cache
            .apply(&key, Mutation::AppendTask { text: format!("task {n}") }, n)
            .await
            .unwrap();
    }
    let before = cache.get(&key).await.unwrap();
    assert_eq!(before.version(), 5);

    let err = cache
        .apply(&key, Mutation::Complete { line: 0, at: Stamp::today() }, 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CacheError::Conflict { expected: 3, actual: 5, .. }
    ));

    let after = cache.get(&key).await.unwrap();
    assert_eq!(after.as_ref(), before.as_ref());
}

#[tokio::test]
async fn rejected_mutation_leaves_state_untouched() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    let err = cache
        .apply(&key, Mutation::Reopen { line: 0 }, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Rejected { .. }));
    let doc = cache.get(&key).await.unwrap();
    assert_eq!(doc.version(), 0);
    assert!(!doc.is_dirty());
}

#[tokio::test]
async fn failed_flush_keeps_document_dirty_until_reinvoked() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let failing = FailingStore::new(store.root());
    let cache = DocumentCache::new(failing.clone(), CacheConfig::default());
    let key = key("today.md");

    cache
        .apply(&key, Mutation::AppendTask { text: "new".into() }, 0)
        .await
        .unwrap();
    failing.set_failing(true);

    let err = cache.flush(&key).await.unwrap_err();
    assert!(matches!(err, CacheError::FlushFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(cache.dirty_keys(), vec![key.clone()]);
    assert_eq!(store.read("today.md"), SAMPLE_TODAY);
    assert_eq!(failing.write_attempts(), 1);

    failing.set_failing(false);
    cache.flush(&key).await.unwrap();
    assert!(cache.dirty_keys().is_empty());
    assert!(store.read("today.md").ends_with("- [ ] new\n"));
    assert_eq!(cache.stats().flush_failures, 1);
}

#[tokio::test]
async fn external_and_cached_additions_both_survive_flush() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    cache
        .apply(&key, Mutation::AppendTask { text: "from cache".into() }, 0)
        .await
        .unwrap();
    store.write("today.md", &format!("{SAMPLE_TODAY}- [ ] from disk\n"));

    cache.flush(&key).await.unwrap();
    assert_eq!(
        store.read("today.md"),
        format!("{SAMPLE_TODAY}- [ ] from cache\n- [ ] from disk\n")
    );
}

#[tokio::test]
async fn cached_edit_is_not_resurrected_by_external_change() {
    let store = TempStore::with_file("today.md", "- [ ] buy milk\n");
    let cache = cache_over(&store);
    let key = key("today.md");

    cache
        .apply(&key, Mutation::EditText { line: 0, text: "buy oat milk".into() }, 0)
        .await
        .unwrap();
    store.write("today.md", "- [ ] buy milk\n- [ ] external\n");

    cache.flush(&key).await.unwrap();
    assert_eq!(store.read("today.md"), "- [ ] buy oat milk\n- [ ] external\n");

    // The written content is the new base: a second external edit merges cleanly.
    store.write("today.md", "- [ ] buy oat milk\n- [ ] external\n- [ ] later\n");
    let doc = cache.get(&key).await.unwrap();
    cache
        .apply(&key, Mutation::EditText { line: 1, text: "external, edited".into() }, doc.version())
        .await
        .unwrap();
    store.write("today.md", "- [ ] buy oat milk\n- [ ] external\n- [ ] later\n- [ ] last\n");
    cache.flush(&key).await.unwrap();
    assert_eq!(
        store.read("today.md"),
        "- [ ] buy oat milk\n- [ ] external, edited\n- [ ] later\n- [ ] last\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_instances_flushing_concurrently_lose_nothing() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let key = key("today.md");
    let first = cache_over(&store);
    let second = cache_over(&store);

    first
        .apply(&key, Mutation::AppendTask { text: "from first".into() }, 0)
        .await
        .unwrap();
    second
        .apply(&key, Mutation::AppendTask { text: "from second".into() }, 0)
        .await
        .unwrap();

    let (a, b) = tokio::join!(first.flush(&key), second.flush(&key));
    a.unwrap();
    b.unwrap();

    let text = store.read("today.md");
    assert!(text.starts_with(SAMPLE_TODAY));
    assert_eq!(text.matches("- [ ] from first\n").count(), 1);
    assert_eq!(text.matches("- [ ] from second\n").count(), 1);
    assert!(!store.exists(".today.md.lock"));
}

#[tokio::test]
async fn get_reloads_external_change_and_moves_version_forward() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    cache
        .apply(&key, Mutation::AppendTask { text: "a".into() }, 0)
        .await
        .unwrap();
    cache.flush(&key).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap().version(), 1);

    store.write("today.md", "- [x] buy milk (2025-01-02)\n");
    let doc = cache.get(&key).await.unwrap();
    assert_eq!(doc.version(), 2);
    assert!(!doc.is_dirty());
    assert_eq!(doc.tasks().count(), 1);
    assert_eq!(cache.stats().reloads, 1);
}

#[tokio::test]
async fn stale_dirty_document_merges_instead_of_discarding() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    cache
        .apply(&key, Mutation::Complete { line: 0, at: stamp("2025-01-05") }, 0)
        .await
        .unwrap();
    store.write("today.md", &format!("{SAMPLE_TODAY}- [ ] external\n"));

    let doc = cache.get(&key).await.unwrap();
    assert!(doc.is_dirty());
    assert_eq!(doc.version(), 2);
    let statuses: Vec<_> = doc.tasks().map(|(_, t)| (t.text.clone(), t.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("buy milk".to_string(), LineStatus::Completed),
            ("call client".to_string(), LineStatus::Completed),
            ("external".to_string(), LineStatus::Pending),
        ]
    );
}

#[tokio::test]
async fn missing_documents_are_not_found_until_created() {
    let store = TempStore::new();
    let cache = cache_over(&store);
    let key = key("projects/new.md");

    let err = cache.get(&key).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!cache.contains(&key));

    let doc = cache.get_or_create(&key).await.unwrap();
    assert!(doc.is_dirty());
    cache
        .apply(&key, Mutation::AppendTask { text: "first".into() }, doc.version())
        .await
        .unwrap();
    cache.flush(&key).await.unwrap();
    assert_eq!(store.read("projects/new.md"), "- [ ] first\n");
}

#[tokio::test]
async fn malformed_file_surfaces_parse_error() {
    let store = TempStore::with_file("bad.md", "- [ ] fine\n- [~] broken\n");
    let cache = cache_over(&store);

    match cache.get(&key("bad.md")).await {
        Err(CacheError::Parse { source, .. }) => assert_eq!(source.line(), 2),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn flush_linked_writes_both_documents() {
    let store = TempStore::with_file("tasks/today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let primary = key("tasks/today.md");
    let archive = cache.archive_key(&primary);
    assert_eq!(archive, key("tasks/today.archive.md"));

    let doc = cache.get(&primary).await.unwrap();
    let record = doc.task(1).unwrap().archived_copy(stamp("2025-01-02T09:00:00Z"));
    cache
        .apply(
            &primary,
            Mutation::Archive { line: 1, at: stamp("2025-01-02T09:00:00Z") },
            doc.version(),
        )
        .await
        .unwrap();
    let archived = cache.get_or_create(&archive).await.unwrap();
    cache
        .apply(&archive, Mutation::AppendArchived { record }, archived.version())
        .await
        .unwrap();

    cache.flush_linked(&primary, &archive).await.unwrap();
    let line = "- [x] call client (2025-01-01) <!-- archived 2025-01-02T09:00:00Z -->\n";
    assert_eq!(store.read("tasks/today.archive.md"), line);
    assert_eq!(store.read("tasks/today.md"), format!("- [ ] buy milk\n{line}"));
    assert!(cache.dirty_keys().is_empty());
}

#[tokio::test]
async fn flush_all_reports_each_dirty_key() {
    let store = TempStore::new();
    store.write("a.md", "- [ ] a\n");
    store.write("b.md", "- [ ] b\n");
    let cache = cache_over(&store);

    for name in ["a.md", "b.md"] {
        cache
            .apply(&key(name), Mutation::Complete { line: 0, at: stamp("2025-01-01") }, 0)
            .await
            .unwrap();
    }

    let report = cache.flush_all().await;
    assert!(report.is_success());
    assert_eq!(report.flushed, vec![key("a.md"), key("b.md")]);
    assert_eq!(store.read("a.md"), "- [x] a (2025-01-01)\n");
}

#[tokio::test]
async fn background_flush_cancelled_before_write_keeps_document_dirty() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");
    cache
        .apply(&key, Mutation::AppendTask { text: "later".into() }, 0)
        .await
        .unwrap();

    // The current-thread runtime has not polled the flush task yet.
    let handle = cache.flush_in_background(&key);
    assert_eq!(handle.phase(), FlushPhase::Pending);
    assert!(handle.cancel());

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, CacheError::Cancelled { .. }));
    assert_eq!(store.read("today.md"), SAMPLE_TODAY);
    assert_eq!(cache.dirty_keys(), vec![key]);
}

#[tokio::test]
async fn started_write_cannot_be_cancelled_and_queued_flush_can() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let gated = GatedStore::new(store.root());
    let cache = DocumentCache::new(gated.clone(), CacheConfig::default());
    let key: DocKey = key("today.md");
    cache
        .apply(&key, Mutation::AppendTask { text: "gated".into() }, 0)
        .await
        .unwrap();

    let writing = cache.flush_in_background(&key);
    gated.write_started().await;
    assert_eq!(writing.phase(), FlushPhase::Writing);
    assert!(!writing.cancel());

    let queued = cache.flush_in_background(&key);
    assert!(queued.cancel());

    gated.release_one();
    writing.wait().await.unwrap();
    assert!(matches!(
        queued.wait().await,
        Err(CacheError::Cancelled { .. })
    ));
    assert!(store.read("today.md").ends_with("- [ ] gated\n"));
}

#[tokio::test]
async fn readers_see_whole_snapshots() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");

    let before = cache.get(&key).await.unwrap();
    cache
        .apply(
            &key,
            Mutation::batch(vec![
                Mutation::AppendTask { text: "x".into() },
                Mutation::AppendTask { text: "y".into() },
            ]),
            0,
        )
        .await
        .unwrap();
    let after = cache.get(&key).await.unwrap();

    assert_eq!(before.tasks().count(), 2);
    assert_eq!(after.tasks().count(), 4);
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_never_observe_half_a_batch() {
    let store = TempStore::with_file("today.md", SAMPLE_TODAY);
    let cache = cache_over(&store);
    let key = key("today.md");
    cache.get(&key).await.unwrap();

    let writer = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move {
            for round in 0..50u64 {
                let batch = Mutation::batch(vec![
                    Mutation::AppendTask { text: format!("first {round}") },
                    Mutation::AppendTask { text: format!("second {round}") },
                ]);
                cache.apply(&key, batch, round).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                loop {
                    let doc = cache.get(&key).await.unwrap();
                    assert_eq!(doc.tasks().count() as u64, 2 + 2 * doc.version());
                    seen += 1;
                    if doc.version() == 50 {
                        return seen;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        assert!(reader.await.unwrap() >= 1);
    }
}
