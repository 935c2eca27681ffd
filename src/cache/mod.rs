//! Graph cache: memory snapshots over the persisted repository, with
//! single-flight rebuilds.

pub mod flight;
pub mod service;

pub use flight::{Landed, SingleFlight};
pub use service::{CacheStatus, GraphCacheService, DEFAULT_BUILD_TIMEOUT};
