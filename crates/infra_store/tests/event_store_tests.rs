//! Event store tests
//!
//! Covers the append contract (monotonic versions, compare-and-swap, batch
//! atomicity) on the in-memory and JSON file backends.

use std::sync::Arc;

use core_kernel::{AdapterHealth, SakId};
use domain_koe::{Event, EventType};
use infra_store::{
    open_store, EventRepository, EventStore, InMemoryEventRepository, JsonFileEventRepository,
    StoreConfig, StoreError,
};
use test_utils::{sak_id_strategy, EventBuilder, IdFixtures, Scenario, TemporalFixtures};

fn memory_store() -> Arc<EventStore<InMemoryEventRepository>> {
    Arc::new(EventStore::new(Arc::new(InMemoryEventRepository::new())))
}

fn event(sak_id: &SakId, event_type: EventType, n: usize) -> Event {
    EventBuilder::new(event_type)
        .sak(sak_id.clone())
        .at(TemporalFixtures::step(n))
        .build()
}

// ============================================================================
// Append contract
// ============================================================================

mod append_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unknown_case_is_empty() {
        let store = memory_store();
        let log = store.get_events(&IdFixtures::sak_id()).await.unwrap();
        assert!(log.events.is_empty());
        assert_eq!(log.version, 0);
    }

    #[tokio::test]
    async fn test_versions_advance_by_one() {
        let store = memory_store();
        let sak = IdFixtures::sak_id();

        let v1 = store.append(event(&sak, EventType::SakOpprettet, 0), 0).await.unwrap();
        let v2 = store.append(event(&sak, EventType::GrunnlagOpprettet, 1), v1).await.unwrap();
        let v3 = store.append(event(&sak, EventType::ResponsGrunnlag, 2), v2).await.unwrap();

        assert_eq!((v1, v2, v3), (1, 2, 3));
        let log = store.get_events(&sak).await.unwrap();
        assert_eq!(log.version, 3);
        assert_eq!(
            log.events.iter().map(Event::event_type).collect::<Vec<_>>(),
            vec![
                EventType::SakOpprettet,
                EventType::GrunnlagOpprettet,
                EventType::ResponsGrunnlag
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_side_effects() {
        let store = memory_store();
        let sak = IdFixtures::sak_id();
        store.append(event(&sak, EventType::SakOpprettet, 0), 0).await.unwrap();

        let err = store
            .append(event(&sak, EventType::GrunnlagOpprettet, 1), 0)
            .await
            .unwrap_err();

        match err {
            StoreError::Concurrency { expected, actual, .. } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected concurrency error, got {other:?}"),
        }
        assert_eq!(store.get_events(&sak).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_version_ahead_of_log_is_rejected() {
        let store = memory_store();
        let sak = IdFixtures::sak_id();
        let err = store
            .append(event(&sak, EventType::SakOpprettet, 0), 5)
            .await
            .unwrap_err();
        assert!(err.is_concurrency());
        assert!(store.get_events(&sak).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cases_are_independent() {
        let store = memory_store();
        let a = IdFixtures::sak_id_n(1);
        let b = IdFixtures::sak_id_n(2);

        store.append(event(&a, EventType::SakOpprettet, 0), 0).await.unwrap();
        store.append(event(&b, EventType::SakOpprettet, 0), 0).await.unwrap();
        store.append(event(&a, EventType::GrunnlagOpprettet, 1), 1).await.unwrap();

        assert_eq!(store.get_events(&a).await.unwrap().version, 2);
        assert_eq!(store.get_events(&b).await.unwrap().version, 1);
        assert_eq!(store.list_saker().await.unwrap(), vec![a, b]);
    }
}

// ============================================================================
// Batches
// ============================================================================

mod batch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_batch_advances_by_its_length() {
        let store = memory_store();
        let scenario = Scenario::ny(IdFixtures::sak_id())
            .opprettet()
            .grunnlag_sendt()
            .vederlag_sendt();

        let version = store.append_batch(scenario.events().to_vec(), 0).await.unwrap();

        assert_eq!(version, 3);
        let log = store.get_events(scenario.sak_id()).await.unwrap();
        assert_eq!(log.events, scenario.into_events());
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let store = memory_store();
        let err = store.append_batch(Vec::new(), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatch(_)));
    }

    #[tokio::test]
    async fn test_mixed_case_batch_is_rejected() {
        let store = memory_store();
        let a = IdFixtures::sak_id_n(1);
        let b = IdFixtures::sak_id_n(2);
        let batch = vec![
            event(&a, EventType::SakOpprettet, 0),
            event(&b, EventType::SakOpprettet, 0),
        ];

        let err = store.append_batch(batch, 0).await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidBatch(_)));
        assert!(store.list_saker().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_batch_appends_nothing() {
        let store = memory_store();
        let scenario = Scenario::ny(IdFixtures::sak_id()).opprettet();
        store.append_batch(scenario.events().to_vec(), 0).await.unwrap();

        let stale = Scenario::ny(IdFixtures::sak_id())
            .opprettet()
            .grunnlag_sendt()
            .into_events();
        let err = store.append_batch(stale, 0).await.unwrap_err();

        assert!(err.is_concurrency());
        assert_eq!(store.get_events(scenario.sak_id()).await.unwrap().version, 1);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WRITERS: usize = 16;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_writer_wins_a_version() {
        let store = memory_store();
        let sak = IdFixtures::sak_id();
        store.append(event(&sak, EventType::SakOpprettet, 0), 0).await.unwrap();

        let handles: Vec<_> = (0..WRITERS)
            .map(|n| {
                let store = Arc::clone(&store);
                let candidate = event(&sak, EventType::GrunnlagOpprettet, n + 1);
                tokio::spawn(async move { store.append(candidate, 1).await })
            })
            .collect();

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(version) => {
                    assert_eq!(version, 2);
                    wins += 1;
                }
                Err(e) if e.is_concurrency() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(conflicts, WRITERS - 1);
        assert_eq!(store.get_events(&sak).await.unwrap().version, 2);
        assert_eq!(store.active_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retrying_writers_lose_nothing() {
        let store = memory_store();
        let sak = IdFixtures::sak_id();
        store.append(event(&sak, EventType::SakOpprettet, 0), 0).await.unwrap();

        let handles: Vec<_> = (0..WRITERS)
            .map(|n| {
                let store = Arc::clone(&store);
                let sak = sak.clone();
                tokio::spawn(async move {
                    let candidate = event(&sak, EventType::GrunnlagOppdatert, n + 1);
                    loop {
                        let version = store.get_events(&sak).await.unwrap().version;
                        match store.append(candidate.clone(), version).await {
                            Ok(_) => return candidate.event_id,
                            Err(e) if e.is_concurrency() => tokio::task::yield_now().await,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        let mut written = Vec::new();
        for handle in handles {
            written.push(handle.await.unwrap());
        }

        let log = store.get_events(&sak).await.unwrap();
        assert_eq!(log.version, WRITERS as u64 + 1);
        for event_id in written {
            assert_eq!(
                log.events.iter().filter(|e| e.event_id == event_id).count(),
                1
            );
        }
        assert_eq!(store.active_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_registry_does_not_grow_with_cases() {
        let store = memory_store();

        let handles: Vec<_> = (0..200)
            .map(|n| {
                let store = Arc::clone(&store);
                let sak = IdFixtures::sak_id_n(n);
                tokio::spawn(async move {
                    store.append(event(&sak, EventType::SakOpprettet, 0), 0).await
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }

        assert_eq!(store.list_saker().await.unwrap().len(), 200);
        assert_eq!(store.active_locks(), 0);
    }
}

// ============================================================================
// File backend
// ============================================================================

mod file_backend_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_every_case_id_is_a_file_stem(sak in sak_id_strategy()) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let repo = JsonFileEventRepository::open(dir.path()).await.unwrap();
                repo.write(&sak, &[event(&sak, EventType::SakOpprettet, 0)], 0)
                    .await
                    .unwrap();

                assert!(dir.path().join(format!("{sak}.json")).is_file());
                assert_eq!(repo.list_saker().await.unwrap(), vec![sak.clone()]);
                assert_eq!(repo.read(&sak).await.unwrap().version, 1);
            });
        }
    }

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = Scenario::ny(IdFixtures::sak_id()).opprettet().grunnlag_sendt();

        {
            let store = open_store(&StoreConfig::file(dir.path())).await.unwrap();
            store.append_batch(scenario.events().to_vec(), 0).await.unwrap();
        }

        let reopened = open_store(&StoreConfig::file(dir.path())).await.unwrap();
        let log = reopened.get_events(scenario.sak_id()).await.unwrap();
        assert_eq!(log.version, 2);
        assert_eq!(log.events, scenario.into_events());
    }

    #[tokio::test]
    async fn test_one_document_per_case_and_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(Arc::new(
            JsonFileEventRepository::open(dir.path()).await.unwrap(),
        ));
        for n in 0..3 {
            let sak = IdFixtures::sak_id_n(n);
            store.append(event(&sak, EventType::SakOpprettet, 0), 0).await.unwrap();
            store.append(event(&sak, EventType::FristKravSendt, 1), 1).await.unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["KOE-0000.json", "KOE-0001.json", "KOE-0002.json"]);
    }

    #[tokio::test]
    async fn test_document_format() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileEventRepository::open(dir.path()).await.unwrap();
        let sak = IdFixtures::sak_id();
        repo.write(&sak, &[event(&sak, EventType::SakOpprettet, 0)], 0)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("KOE-2024-001.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["events"][0]["event_type"], "sak_opprettet");
        assert_eq!(doc["events"][0]["data"]["sakstittel"], "Endret fundamentering akse B");
    }

    #[tokio::test]
    async fn test_repository_write_checks_version() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileEventRepository::open(dir.path()).await.unwrap();
        let sak = IdFixtures::sak_id();
        repo.write(&sak, &[event(&sak, EventType::SakOpprettet, 0)], 0)
            .await
            .unwrap();

        let err = repo
            .write(&sak, &[event(&sak, EventType::GrunnlagOpprettet, 1)], 0)
            .await
            .unwrap_err();
        assert!(err.is_concurrency());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_backend_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EventStore::new(Arc::new(
            JsonFileEventRepository::open(dir.path()).await.unwrap(),
        )));
        let sak = IdFixtures::sak_id();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                let candidate = event(&sak, EventType::SakOpprettet, n);
                tokio::spawn(async move { store.append(candidate, 0).await.is_ok() })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.get_events(&sak).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_health_check_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&StoreConfig::file(dir.path())).await.unwrap();
        let health = store.health_check().await;
        assert_eq!(health.status, AdapterHealth::Healthy);
    }
}
