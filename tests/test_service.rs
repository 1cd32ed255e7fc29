mod common;

use common::{local_backends, memory_service, seeded_service, FlakyEngine, FlakyStore, SIX_DIM_FIXTURE};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use vecbridge::application::service::{VectorService, DEFAULT_EPSILON};
use vecbridge::domain::error::DomainError;
use vecbridge::domain::ports::mapping_store::MappingStore;
use vecbridge::domain::ports::vector_engine::VectorEngine;
use vecbridge::infrastructure::mapping::memory::MemoryMappingStore;

#[test]
fn test_search_finds_each_fixture_vector() {
    let service = seeded_service(Arc::new(MemoryMappingStore::new()));
    for (id, v) in SIX_DIM_FIXTURE {
        let hits = service.search(&v, 1, DEFAULT_EPSILON).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id.as_bytes().to_vec());
        assert_eq!(hits[0].distance, 0.0);
    }
}

#[test]
fn test_search_by_id_round_trips_on_every_backend() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in local_backends(dir.path()) {
        let service = seeded_service(store);
        for (id, _) in SIX_DIM_FIXTURE {
            let hits = service.search_by_id(id.as_bytes(), 1, DEFAULT_EPSILON).unwrap();
            assert_eq!(hits[0].id, id.as_bytes().to_vec(), "{name}");
            assert_eq!(hits[0].distance, 0.0, "{name}");
        }
    }
}

#[test]
fn test_search_results_are_aligned_and_sorted() {
    let service = memory_service(Some(2));
    service.insert(&[0.0, 0.0], b"origin").unwrap();
    service.insert(&[3.0, 4.0], b"five").unwrap();
    service.insert(&[1.0, 0.0], b"one").unwrap();

    let hits = service.search(&[0.0, 0.0], 3, DEFAULT_EPSILON).unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
    assert_eq!(ids, vec![b"origin".to_vec(), b"one".to_vec(), b"five".to_vec()]);
    assert!((hits[2].distance - 5.0).abs() < 1e-6);

    assert_eq!(service.search(&[0.0, 0.0], 10, DEFAULT_EPSILON).unwrap().len(), 3);
}

#[test]
fn test_remove_deletes_both_sides() {
    let service = seeded_service(Arc::new(MemoryMappingStore::new()));
    let handle = service.store().get_handle(b"b").unwrap();

    service.remove(b"b").unwrap();

    assert!(service.store().get_handle(b"b").unwrap_err().is_not_found());
    assert!(service.store().get_id(handle).unwrap_err().is_not_found());
    assert!(service.engine().get_vector(handle).unwrap_err().is_not_found());
    assert!(service.search_by_id(b"b", 1, DEFAULT_EPSILON).unwrap_err().is_not_found());
    assert!(service.remove(b"b").unwrap_err().is_not_found());

    let hits = service.search(&[0.0, 1.0, 0.0, 0.0, 0.0, 0.0], 6, DEFAULT_EPSILON).unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.iter().all(|h| h.id != b"b".to_vec()));
}

#[test]
fn test_dimension_mismatch_leaves_no_record() {
    let service = memory_service(Some(6));
    let err = service.insert(&[1.0, 2.0, 3.0], b"x").unwrap_err();
    assert!(matches!(err, DomainError::DimensionMismatch { expected: 6, actual: 3 }));
    assert!(service.store().get_handle(b"x").unwrap_err().is_not_found());
    assert_eq!(service.dimension(), Some(6));
}

#[test]
fn test_first_insert_fixes_dimension() {
    let service = memory_service(None);
    assert_eq!(service.dimension(), None);
    service.insert(&[1.0, 2.0], b"p").unwrap();
    assert_eq!(service.dimension(), Some(2));
    assert!(matches!(
        service.search(&[1.0, 2.0, 3.0], 1, DEFAULT_EPSILON),
        Err(DomainError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_failed_mapping_rolls_back_engine_insert() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(FlakyEngine::new(Some(2)));
    let service = VectorService::new(engine.clone(), store.clone());

    store.fail_set.store(true, Ordering::SeqCst);
    let err = service.insert(&[1.0, 1.0], b"lost").unwrap_err();
    assert!(matches!(err, DomainError::BackendUnavailable(_)), "{err}");
    assert!(engine.inner.is_empty().unwrap());
    assert!(store.get_handle(b"lost").unwrap_err().is_not_found());
}

#[test]
fn test_failed_rollback_surfaces_consistency_window() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(FlakyEngine::new(Some(2)));
    let service = VectorService::new(engine.clone(), store.clone());

    store.fail_set.store(true, Ordering::SeqCst);
    engine.fail_remove.store(true, Ordering::SeqCst);
    let err = service.insert(&[1.0, 1.0], b"orphan").unwrap_err();
    match err {
        DomainError::ConsistencyWindow { operation, handle, .. } => {
            assert_eq!(operation, "insert");
            // The engine still holds the vector, unreachable by id.
            assert!(engine.get_vector(handle).is_ok());
        }
        other => panic!("expected consistency window, got {other}"),
    }
    assert!(store.get_handle(b"orphan").unwrap_err().is_not_found());
}

#[test]
fn test_engine_remove_failure_keeps_mapping() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(FlakyEngine::new(Some(2)));
    let service = VectorService::new(engine.clone(), store.clone());
    let record = service.insert(&[1.0, 0.0], b"kept").unwrap();

    engine.fail_remove.store(true, Ordering::SeqCst);
    assert!(service.remove(b"kept").is_err());
    assert_eq!(store.get_handle(b"kept").unwrap(), record.handle);
    assert!(engine.get_vector(record.handle).is_ok());
}

#[test]
fn test_mapping_delete_failure_is_consistency_window() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(FlakyEngine::new(Some(2)));
    let service = VectorService::new(engine.clone(), store.clone());
    let record = service.insert(&[1.0, 0.0], b"stale").unwrap();

    store.fail_delete.store(true, Ordering::SeqCst);
    let err = service.remove(b"stale").unwrap_err();
    assert!(matches!(
        err,
        DomainError::ConsistencyWindow { operation: "remove", .. }
    ));
    assert!(engine.get_vector(record.handle).unwrap_err().is_not_found());
    assert_eq!(store.get_handle(b"stale").unwrap(), record.handle);
}

#[test]
fn test_reinserting_live_id_is_rejected() {
    let service = memory_service(Some(2));
    let a = service.insert(&[1.0, 0.0], b"a").unwrap();
    service.insert(&[0.0, 1.0], b"b").unwrap();

    let err = service.insert(&[5.0, 5.0], b"a").unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)), "{err}");
    assert_eq!(service.store().get_handle(b"a").unwrap(), a.handle);
    assert_eq!(service.engine().get_vector(a.handle).unwrap(), vec![1.0, 0.0]);

    let hits = service.search(&[1.0, 0.0], 1, DEFAULT_EPSILON).unwrap();
    assert_eq!(hits[0].id, b"a".to_vec());
    let hits = service.search_by_id(b"b", 3, DEFAULT_EPSILON).unwrap();
    assert_eq!(hits.len(), 2);

    // Replacing goes through remove.
    service.remove(b"a").unwrap();
    service.insert(&[5.0, 5.0], b"a").unwrap();
    let hits = service.search(&[5.0, 5.0], 1, DEFAULT_EPSILON).unwrap();
    assert_eq!(hits[0].id, b"a".to_vec());
    assert_eq!(service.search(&[0.0, 0.0], 10, DEFAULT_EPSILON).unwrap().len(), 2);
}

#[test]
fn test_insert_many_collects_errors() {
    let service = memory_service(Some(2));
    let items = vec![
        (b"ok-1".to_vec(), vec![1.0, 0.0]),
        (b"short".to_vec(), vec![1.0]),
        (b"ok-2".to_vec(), vec![0.0, 1.0]),
    ];
    let report = service.insert_many(&items);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].index, 1);
    assert_eq!(report.errors[0].id, "short");
    assert!(service.store().get_handle(b"ok-2").is_ok());
}

#[test]
fn test_remove_many_collects_errors() {
    let service = seeded_service(Arc::new(MemoryMappingStore::new()));
    let report = service.remove_many(&[b"a".to_vec(), b"missing".to_vec(), b"c".to_vec()]);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, "missing");
    assert!(service.store().get_handle(b"c").unwrap_err().is_not_found());
}

#[test]
fn test_get_objects_returns_stored_vectors() {
    let service = seeded_service(Arc::new(MemoryMappingStore::new()));
    let objects = service.get_objects(&[b"c".to_vec(), b"zz".to_vec()]);
    assert_eq!(objects[0].as_ref().unwrap(), &vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    assert!(objects[1].as_ref().unwrap_err().is_not_found());
}

#[test]
fn test_reused_handle_maps_to_new_id() {
    let service = memory_service(Some(2));
    let first = service.insert(&[1.0, 0.0], b"first").unwrap();
    service.remove(b"first").unwrap();
    let second = service.insert(&[0.0, 1.0], b"second").unwrap();
    assert_eq!(first.handle, second.handle);
    assert_eq!(service.store().get_id(second.handle).unwrap(), b"second".to_vec());
    let hits = service.search_by_id(b"second", 1, DEFAULT_EPSILON).unwrap();
    assert_eq!(hits[0].id, b"second".to_vec());
}

#[test]
fn test_second_ingest_claim_is_rejected() {
    let service = memory_service(None);
    let guard = service.begin_ingest().unwrap();
    assert!(matches!(service.begin_ingest(), Err(DomainError::AlreadyRunning)));
    drop(guard);
    assert!(service.begin_ingest().is_ok());
}

#[test]
fn test_concurrent_queries_and_inserts() {
    let service = memory_service(Some(2));
    service.insert(&[0.0, 0.0], b"anchor").unwrap();

    std::thread::scope(|s| {
        for t in 0..4 {
            let service = &service;
            s.spawn(move || {
                for i in 0..50 {
                    let id = format!("t{t}-{i}");
                    service.insert(&[t as f64 + 1.0, i as f64], id.as_bytes()).unwrap();
                    let hits = service.search_by_id(b"anchor", 1, DEFAULT_EPSILON).unwrap();
                    assert_eq!(hits[0].id, b"anchor".to_vec());
                }
            });
        }
    });

    for t in 0..4 {
        for i in 0..50 {
            let id = format!("t{t}-{i}");
            let hits = service.search_by_id(id.as_bytes(), 1, DEFAULT_EPSILON).unwrap();
            assert_eq!(hits[0].id, id.into_bytes());
        }
    }
}
