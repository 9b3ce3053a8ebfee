//! Assignment compare-and-insert, counting and soft state.

use std::sync::{Arc, Barrier};

use chrono::Utc;
use cohort_core::errors::CohortError;
use cohort_core::models::{Assignment, AssignmentMethod, CohortType, Experiment, InsertOutcome};
use cohort_core::traits::IExperimentStorage;
use cohort_storage::{MemoryStorage, StorageEngine};

fn backends() -> Vec<(&'static str, Arc<dyn IExperimentStorage>)> {
    vec![
        ("sqlite", Arc::new(StorageEngine::open_in_memory().unwrap())),
        ("memory", Arc::new(MemoryStorage::new())),
    ]
}

fn control(user: &str, experiment_id: u64) -> Assignment {
    let mut a = Assignment::new(user, experiment_id, CohortType::Control, "control", AssignmentMethod::HashBased);
    a.assignment_hash = Some(u64::MAX - 3);
    a
}

#[test]
fn insert_if_absent_then_existing() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("cas")).unwrap();

        let first = store.insert_assignment_if_absent(&control("u1", exp.id)).unwrap();
        let InsertOutcome::Inserted(stored) = first else {
            panic!("{name}: first insert should write");
        };
        assert!(stored.id > 0);

        let mut other = control("u1", exp.id);
        other.cohort_type = CohortType::Treatment;
        other.variant_name = "test".into();
        let second = store.insert_assignment_if_absent(&other).unwrap();
        let InsertOutcome::Existing(existing) = second else {
            panic!("{name}: second insert must not write");
        };
        assert_eq!(existing.id, stored.id, "{name}");
        assert_eq!(existing.cohort_type, CohortType::Control, "{name}: winner's row kept");
        assert_eq!(existing.assignment_hash, Some(u64::MAX - 3), "{name}: hash survives storage");
        assert_eq!(store.count_assignments(exp.id).unwrap(), 1, "{name}");
    }
}

#[test]
fn counted_insert_counts_participants_once() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("counted")).unwrap();

        let mut treatment = control("t", exp.id);
        treatment.cohort_type = CohortType::Treatment;
        let excluded = Assignment::new("x", exp.id, CohortType::Excluded, "excluded", AssignmentMethod::HashBased);

        store.insert_assignment_counted(&control("c", exp.id)).unwrap();
        store.insert_assignment_counted(&treatment).unwrap();
        store.insert_assignment_counted(&excluded).unwrap();
        store.insert_assignment_counted(&control("c", exp.id)).unwrap();

        let stored = store.get_experiment(exp.id).unwrap().unwrap();
        assert_eq!(stored.current_sample_size, 2, "{name}");
        assert_eq!(store.count_assignments(exp.id).unwrap(), 3, "{name}");
    }
}

#[test]
fn insert_for_missing_experiment_is_not_found() {
    for (name, store) in backends() {
        let err = store.insert_assignment_if_absent(&control("u", 12345)).unwrap_err();
        assert!(matches!(err, CohortError::NotFound { .. }), "{name}: {err}");
    }
}

#[test]
fn failed_count_rolls_back_the_row() {
    let store = StorageEngine::open_in_memory().unwrap();
    // Without the foreign key, the row insert succeeds and only the counter
    // update can fail.
    store
        .pool()
        .writer
        .with_conn_sync(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = OFF").unwrap();
            Ok(())
        })
        .unwrap();

    let err = store.insert_assignment_counted(&control("orphan", 999)).unwrap_err();
    assert!(matches!(err, CohortError::NotFound { entity: "experiment", .. }), "{err}");
    assert!(store.find_assignment("orphan", 999).unwrap().is_none());
    assert_eq!(store.count_assignments(999).unwrap(), 0);

    let uncounted = store.insert_assignment_if_absent(&control("orphan", 999)).unwrap();
    assert!(uncounted.was_inserted(), "foreign keys really are off");
}

#[test]
fn update_touches_exposure_and_active_only() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("exposure")).unwrap();
        let stored = store
            .insert_assignment_if_absent(&control("u", exp.id))
            .unwrap()
            .into_assignment();

        let mut changed = stored.clone();
        changed.record_exposure(Utc::now());
        changed.is_active = false;
        changed.variant_name = "tampered".into();
        store.update_assignment(&changed).unwrap();

        let reread = store.find_assignment("u", exp.id).unwrap().unwrap();
        assert_eq!(reread.exposure_count, 1, "{name}");
        assert!(reread.first_exposure_at.is_some(), "{name}");
        assert!(!reread.is_active, "{name}");
        assert_eq!(reread.variant_name, "control", "{name}: decision columns immutable");
    }
}

#[test]
fn update_missing_assignment_is_not_found() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("none")).unwrap();
        let err = store.update_assignment(&control("nobody", exp.id)).unwrap_err();
        assert!(matches!(err, CohortError::NotFound { .. }), "{name}: {err}");
    }
}

#[test]
fn assignments_for_user_spans_experiments() {
    for (name, store) in backends() {
        let a = store.create_experiment(&Experiment::draft("a")).unwrap();
        let b = store.create_experiment(&Experiment::draft("b")).unwrap();
        store.insert_assignment_if_absent(&control("u", a.id)).unwrap();
        store.insert_assignment_if_absent(&control("u", b.id)).unwrap();
        store.insert_assignment_if_absent(&control("someone_else", a.id)).unwrap();

        let mine = store.assignments_for_user("u").unwrap();
        let ids: Vec<u64> = mine.iter().map(|x| x.experiment_id).collect();
        assert_eq!(ids, vec![a.id, b.id], "{name}");
    }
}

/// Many threads race the first assignment for one user: exactly one row,
/// exactly one increment, every caller sees the same row.
fn race_first_insert(store: Arc<dyn IExperimentStorage>, label: &str) {
    let exp = store.create_experiment(&Experiment::draft("race")).unwrap();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut candidate = control("racer", exp.id);
                if i % 2 == 1 {
                    candidate.cohort_type = CohortType::Treatment;
                    candidate.variant_name = "test".into();
                }
                barrier.wait();
                store.insert_assignment_counted(&candidate).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<InsertOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let inserted = outcomes.iter().filter(|o| o.was_inserted()).count();
    assert_eq!(inserted, 1, "{label}: exactly one writer wins");

    let ids: Vec<u64> = outcomes.into_iter().map(|o| o.into_assignment().id).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "{label}: all callers see one row");

    assert_eq!(store.count_assignments(exp.id).unwrap(), 1, "{label}");
    let stored = store.get_experiment(exp.id).unwrap().unwrap();
    assert_eq!(stored.current_sample_size, 1, "{label}");
}

#[test]
fn concurrent_first_insert_file_backed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StorageEngine::open(&dir.path().join("race.db")).unwrap();
    race_first_insert(Arc::new(engine), "sqlite-file");
}

#[test]
fn concurrent_first_insert_memory() {
    race_first_insert(Arc::new(MemoryStorage::new()), "memory");
}

#[test]
fn two_engines_on_one_file_share_uniqueness() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = StorageEngine::open(&path).unwrap();
    let second = StorageEngine::open(&path).unwrap();

    let exp = first.create_experiment(&Experiment::draft("shared")).unwrap();
    assert!(first.insert_assignment_counted(&control("u", exp.id)).unwrap().was_inserted());
    assert!(!second.insert_assignment_counted(&control("u", exp.id)).unwrap().was_inserted());
    assert_eq!(second.get_experiment(exp.id).unwrap().unwrap().current_sample_size, 1);
}

#[test]
fn record_exposure_stamps_first_once() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("stamp")).unwrap();
        store.insert_assignment_if_absent(&control("u", exp.id)).unwrap();

        let t1 = Utc::now();
        let first = store.record_exposure("u", exp.id, t1).unwrap();
        let t2 = t1 + chrono::Duration::seconds(30);
        let second = store.record_exposure("u", exp.id, t2).unwrap();

        assert_eq!(first.exposure_count, 1, "{name}");
        assert_eq!(second.exposure_count, 2, "{name}");
        assert_eq!(
            second.first_exposure_at.map(|t| t.timestamp()),
            Some(t1.timestamp()),
            "{name}: first exposure kept"
        );
        assert_eq!(
            second.last_exposure_at.map(|t| t.timestamp()),
            Some(t2.timestamp()),
            "{name}"
        );
    }
}

#[test]
fn record_exposure_without_assignment_is_not_found() {
    for (name, store) in backends() {
        let exp = store.create_experiment(&Experiment::draft("unassigned")).unwrap();
        let err = store.record_exposure("ghost", exp.id, Utc::now()).unwrap_err();
        assert!(matches!(err, CohortError::NotFound { .. }), "{name}: {err}");
    }
}
