//! Session runtime: the run-loop engine, suspension checkpoints,
//! per-session conversation storage, and the scheduler that ties them to
//! inbound client messages.

mod checkpoint;
mod engine;
mod scheduler;
mod store;

pub use checkpoint::{CheckpointStore, InterruptTask};
pub use engine::{EngineError, RunHandle, RunInput, WorkflowRunner};
pub use scheduler::{Scheduler, SchedulerError, SessionRegistry};
pub use store::ConversationStore;
