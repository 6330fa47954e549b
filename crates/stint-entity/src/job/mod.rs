//! Job record domain entities.

pub mod model;
pub mod state;
pub mod stats;

pub use model::{DEFAULT_PRIORITY, DEFAULT_QUEUE, Job, NewJob};
pub use state::JobState;
pub use stats::QueueStats;
