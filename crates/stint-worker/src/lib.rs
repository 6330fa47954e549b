//! Job processing for Stint.
//!
//! This crate provides:
//! - A worker runner that polls the store and executes claimed jobs
//! - A capacity-limited executor that drops work beyond its slot count
//! - A lease heartbeat owned by each claim
//! - A handler trait and a registry dispatching on job class
//! - A producer-side queue for enqueuing jobs

pub mod claim;
pub mod events;
pub mod executor;
pub mod handler;
pub mod heartbeat;
pub mod queue;
pub mod runner;

pub use claim::{Claim, ClaimError};
pub use events::{JobEvent, JobOutcome};
pub use executor::Executor;
pub use handler::{JobHandler, JobRegistry};
pub use heartbeat::{Heartbeat, HeartbeatError, HeartbeatRegistry, Lease};
pub use queue::JobQueue;
pub use runner::{ShutdownHandle, WorkerRunner};
