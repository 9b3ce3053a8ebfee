//! Store boundary. Implementations own all shared mutable state.

pub mod events;
pub mod storage;

pub use events::IEventStorage;
pub use storage::{IExperimentStorage, IFlagStorage};
