//! # cohort-engine
//!
//! Deterministic assignment of users to experiment arms and feature-flag
//! rollout evaluation.
//!
//! - [`hashing`]: `identity:context` → percentile in `[1, 100]` and a seeded parity hash
//! - [`traffic`]: experiment inclusion from a percentile
//! - [`rollout`]: per-user flag evaluation
//! - [`assigner`]: idempotent persisted assignment and exposure recording
//! - [`lifecycle`]: experiment state machine
//! - [`sample_size`]: progress toward the minimum sample size
//! - [`flags`]: flag mutations
//! - [`events`]: append-only event recording
//!
//! [`CohortEngine`] wires all of them over one store.

pub mod assigner;
pub mod events;
pub mod flags;
pub mod hashing;
pub mod lifecycle;
pub mod rollout;
pub mod sample_size;
pub mod traffic;

use std::sync::Arc;

use cohort_core::config::AssignmentConfig;
use cohort_core::traits::{IEventStorage, IExperimentStorage, IFlagStorage};

pub use assigner::CohortAssigner;
pub use events::EventRecorder;
pub use flags::FlagManager;
pub use lifecycle::{ExperimentLifecycle, Transition};
pub use rollout::{FlagEvaluator, RolloutEvaluator};

/// Every component sharing one store.
pub struct CohortEngine {
    pub assigner: CohortAssigner,
    pub lifecycle: ExperimentLifecycle,
    pub flags: FlagManager,
    pub evaluator: FlagEvaluator,
    pub events: Arc<EventRecorder>,
}

impl CohortEngine {
    /// Build the components. `config.record_events` decides whether the
    /// assigner and flag manager emit events.
    pub fn new<S>(storage: Arc<S>, config: &AssignmentConfig) -> Self
    where
        S: IExperimentStorage + IFlagStorage + IEventStorage + 'static,
    {
        let events = Arc::new(EventRecorder::new(storage.clone()));
        let env = config.default_environment.as_str();

        let mut assigner = CohortAssigner::new(storage.clone());
        let mut flags = FlagManager::new(storage.clone(), env);
        if config.record_events {
            assigner = assigner.with_events(events.clone());
            flags = flags.with_events(events.clone());
        }

        Self {
            assigner,
            lifecycle: ExperimentLifecycle::new(storage.clone(), env),
            flags,
            evaluator: FlagEvaluator::new(storage),
            events,
        }
    }
}
