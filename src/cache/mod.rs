//! TTL-based caching for tracker metadata.
//!
//! Two tiers with independent lifetimes sit on top of one generic cache:
//! the long tier holds the workspace project list, the medium tier holds
//! per-project members and workflow states. Expiry is whole-entry; a stale
//! entry is simply absent.

mod tiered;

pub use tiered::TtlCache;
