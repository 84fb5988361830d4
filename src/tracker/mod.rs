//! Upstream tracker API: domain types, wire types, and the typed client.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod types;

pub use cached_client::{CachedTrackerClient, IdentityMap};
pub use client::TrackerClient;
pub use types::{Issue, Project, ProjectMembership, StateGroup, WorkflowState};
