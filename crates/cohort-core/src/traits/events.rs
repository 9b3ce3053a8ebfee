use crate::errors::CohortResult;
use crate::models::Event;

/// Append-only event sink.
pub trait IEventStorage: Send + Sync {
    /// Persist an event and return it with its assigned id.
    fn append_event(&self, event: &Event) -> CohortResult<Event>;
    fn events_for_user(&self, user_id: &str) -> CohortResult<Vec<Event>>;
    fn events_for_experiment(&self, experiment_id: u64) -> CohortResult<Vec<Event>>;
}
