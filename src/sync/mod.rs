//! Background synchronization of a user's tracker tasks.

mod orchestrator;

pub use orchestrator::SyncOrchestrator;
