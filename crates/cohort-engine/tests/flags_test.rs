//! FlagManager mutations, evaluation by name and flag events.

use std::sync::Arc;

use cohort_core::config::AssignmentConfig;
use cohort_core::errors::CohortError;
use cohort_core::models::{EventType, FlagStatus, FlagUpdate};
use cohort_engine::{CohortEngine, RolloutEvaluator};
use cohort_storage::{MemoryStorage, StorageEngine};

fn engine() -> CohortEngine {
    CohortEngine::new(Arc::new(MemoryStorage::new()), &AssignmentConfig::default())
}

#[test]
fn create_starts_disabled() {
    let e = engine();
    let flag = e.flags.create("new_nav", Some("top nav redesign"), None, Some("ops")).unwrap();
    assert!(!flag.enabled);
    assert_eq!(flag.status, FlagStatus::Inactive);
    assert_eq!(flag.rollout_percentage, 0);
    assert_eq!(flag.environment, "development");

    let dup = e.flags.create("new_nav", None, None, None).unwrap_err();
    assert!(matches!(dup, CohortError::Conflict { .. }));
    e.flags.create("new_nav", None, Some("production"), None).unwrap();
}

#[test]
fn toggle_enable_disable_archive() {
    let e = engine();
    let flag = e.flags.create("beta", None, Some("production"), None).unwrap();

    let on = e.flags.toggle(flag.id, "ops").unwrap();
    assert!(on.is_active());
    let off = e.flags.toggle(flag.id, "ops").unwrap();
    assert_eq!((off.enabled, off.status), (false, FlagStatus::Inactive));

    assert!(e.flags.enable(flag.id, "ops").unwrap().is_active());
    assert_eq!(e.flags.disable(flag.id, "ops").unwrap().status, FlagStatus::Inactive);

    let archived = e.flags.archive(flag.id, "ops").unwrap();
    assert_eq!(archived.status, FlagStatus::Archived);
    for result in [e.flags.toggle(flag.id, "ops"), e.flags.enable(flag.id, "ops")] {
        assert!(matches!(result, Err(CohortError::InvalidState { entity: "flag", .. })));
    }
    assert!(!e.flags.get(flag.id).unwrap().enabled);
}

#[test]
fn rollout_bounds() {
    let e = engine();
    let flag = e.flags.create("gradual", None, None, None).unwrap();

    assert!(matches!(
        e.flags.set_rollout(flag.id, 101).unwrap_err(),
        CohortError::Validation { field: "rollout_percentage", .. }
    ));
    assert_eq!(e.flags.set_rollout(flag.id, 40).unwrap().rollout_percentage, 40);
    assert_eq!(e.flags.increase_rollout(flag.id, 25).unwrap().rollout_percentage, 65);
    assert_eq!(e.flags.increase_rollout(flag.id, 250).unwrap().rollout_percentage, 100);
}

#[test]
fn zero_rollout_scenario() {
    let e = engine();
    let flag = e.flags.create("dark_launch", None, Some("production"), None).unwrap();
    e.flags.enable(flag.id, "ops").unwrap();
    e.flags.set_rollout(flag.id, 0).unwrap();

    for i in 0..1000 {
        let user = format!("user-{i}");
        assert!(!e.evaluator.is_enabled_for_user("dark_launch", &user, "production").unwrap());
    }
}

#[test]
fn evaluation_by_name() {
    let store = Arc::new(StorageEngine::open_in_memory().unwrap());
    let e = CohortEngine::new(store, &AssignmentConfig::default());
    let flag = e.flags.create("half", None, Some("production"), None).unwrap();
    e.flags.enable(flag.id, "ops").unwrap();
    let flag = e.flags.set_rollout(flag.id, 50).unwrap();

    assert!(!e.evaluator.is_enabled_for_user("missing", "u1", "production").unwrap());
    assert!(!e.evaluator.is_enabled_for_user("half", "u1", "staging").unwrap());

    let on = (0..2000)
        .filter(|i| {
            let user = format!("user-{i}");
            let by_name = e.evaluator.is_enabled_for_user("half", &user, "production").unwrap();
            assert_eq!(by_name, RolloutEvaluator::enabled_for(&flag, &user, "production"));
            by_name
        })
        .count();
    assert!((850..=1150).contains(&on), "50% rollout enabled {on} of 2000");
}

#[test]
fn flag_changes_are_recorded() {
    let e = engine();
    let flag = e.flags.create("audited", None, None, None).unwrap();
    e.flags.toggle(flag.id, "alice").unwrap();
    e.flags.disable(flag.id, "alice").unwrap();
    e.flags.set_rollout(flag.id, 10).unwrap();

    let events = e.events.events_for_user("alice").unwrap();
    let types: Vec<EventType> = events.iter().map(|ev| ev.event_type).collect();
    assert_eq!(types, vec![EventType::FlagToggled, EventType::FlagDisabled]);
    assert!(events.iter().all(|ev| ev.flag_id == Some(flag.id)));

    let exposure = e.events.track_flag_exposure("u1", &flag, false).unwrap();
    assert_eq!(exposure.event_type, EventType::FlagExposure);
    assert_eq!(exposure.properties["enabled"], false);
}

#[test]
fn conversions_are_recorded() {
    let e = engine();
    let event = e
        .events
        .track_conversion("buyer", 7, "B", Some(42.5), "production")
        .unwrap();
    assert_eq!(event.event_type, EventType::Conversion);
    assert_eq!(event.event_value, Some(42.5));
    assert_eq!(e.events.events_for_experiment(7).unwrap().len(), 1);
    assert!(e.events.track_conversion(" ", 7, "B", None, "production").is_err());
}

#[test]
fn update_renames_and_moves() {
    let e = engine();
    let flag = e.flags.create("search_v1", None, Some("staging"), None).unwrap();
    e.flags.create("taken", None, Some("production"), None).unwrap();

    let clash = FlagUpdate {
        name: "taken".into(),
        description: None,
        environment: "production".into(),
    };
    assert!(matches!(e.flags.update(flag.id, clash).unwrap_err(), CohortError::Conflict { .. }));

    let blank = FlagUpdate {
        name: "search_v2".into(),
        description: None,
        environment: " ".into(),
    };
    assert!(matches!(
        e.flags.update(flag.id, blank).unwrap_err(),
        CohortError::Validation { field: "environment", .. }
    ));

    let moved = e
        .flags
        .update(
            flag.id,
            FlagUpdate {
                name: "search_v2".into(),
                description: Some("ranking rewrite".into()),
                environment: "production".into(),
            },
        )
        .unwrap();
    assert_eq!((moved.name.as_str(), moved.environment.as_str()), ("search_v2", "production"));
    assert!(e.flags.get_by_name("search_v1", "staging").unwrap().is_none());
    assert_eq!(e.flags.get_by_name("search_v2", "production").unwrap().unwrap().id, flag.id);

    e.flags.archive(flag.id, "ops").unwrap();
    let again = FlagUpdate {
        name: "search_v3".into(),
        description: None,
        environment: "production".into(),
    };
    assert!(matches!(e.flags.update(flag.id, again), Err(CohortError::InvalidState { .. })));
}

#[test]
fn enable_and_disable_by_name() {
    let e = engine();
    e.flags.create("promo_banner", None, Some("production"), None).unwrap();
    e.flags.create("promo_banner", None, Some("staging"), None).unwrap();

    let on = e.flags.enable_by_name("promo_banner", "production", "ops").unwrap();
    assert!(on.is_active());
    assert!(!e.flags.get_by_name("promo_banner", "staging").unwrap().unwrap().enabled);

    let off = e.flags.disable_by_name("promo_banner", "production", "ops").unwrap();
    assert_eq!(off.status, FlagStatus::Inactive);

    assert!(matches!(
        e.flags.enable_by_name("promo_banner", "qa", "ops").unwrap_err(),
        CohortError::NotFound { entity: "flag", .. }
    ));
}

#[test]
fn bulk_mutations_apply_in_order() {
    let e = engine();
    let ids: Vec<u64> = ["one", "two", "three"]
        .iter()
        .map(|n| e.flags.create(n, None, None, None).unwrap().id)
        .collect();

    let enabled = e.flags.enable_many(&ids, "ops").unwrap();
    assert!(enabled.iter().all(|f| f.is_active()));

    let rolled = e.flags.set_rollout_many(&ids, 30).unwrap();
    assert!(rolled.iter().all(|f| f.rollout_percentage == 30));
    assert!(matches!(
        e.flags.set_rollout_many(&ids, 120).unwrap_err(),
        CohortError::Validation { field: "rollout_percentage", .. }
    ));
    assert!(ids.iter().all(|&id| e.flags.get(id).unwrap().rollout_percentage == 30));

    let with_missing = [ids[0], 9_999, ids[2]];
    assert!(matches!(
        e.flags.disable_many(&with_missing, "ops").unwrap_err(),
        CohortError::NotFound { .. }
    ));
    assert!(!e.flags.get(ids[0]).unwrap().enabled, "flags before the failure stay changed");
    assert!(e.flags.get(ids[2]).unwrap().enabled, "flags after the failure are untouched");
}

#[test]
fn available_flags_match_per_flag_evaluation() {
    let e = engine();
    for (name, rollout) in [("everyone", 100), ("some", 40), ("nobody", 0)] {
        let flag = e.flags.create(name, None, Some("production"), None).unwrap();
        e.flags.enable(flag.id, "ops").unwrap();
        e.flags.set_rollout(flag.id, rollout).unwrap();
    }
    e.flags.create("never_enabled", None, Some("production"), None).unwrap();
    let other_env = e.flags.create("everyone", None, Some("staging"), None).unwrap();
    e.flags.enable(other_env.id, "ops").unwrap();
    e.flags.set_rollout(other_env.id, 100).unwrap();

    for i in 0..200 {
        let user = format!("user-{i}");
        let names: Vec<String> = e
            .evaluator
            .available_flags_for_user(&user, "production")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert!(names.contains(&"everyone".to_string()), "{user}");
        assert!(!names.contains(&"nobody".to_string()), "{user}");
        assert!(!names.contains(&"never_enabled".to_string()), "{user}");
        assert_eq!(
            names.contains(&"some".to_string()),
            e.evaluator.is_enabled_for_user("some", &user, "production").unwrap(),
            "{user}"
        );
    }
}
