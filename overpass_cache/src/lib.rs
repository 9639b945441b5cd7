//! # overpass_cache
//!
//! The tile-caching engine: everything in SPEC_FULL.md §4 except
//! `QueryInspector` (which lives in `overpass_core` so it has no dependency
//! on redis/reqwest). Nothing here knows about HTTP frameworks or
//! environment variables — `overpass_server` owns that ambient stack.

pub mod assembler;
pub mod conditional_cache;
pub mod dispatcher;
pub mod error;
pub mod fetch_planner;
pub mod rate_limiter;
pub mod tile_grid;
pub mod tile_store;
pub mod upstream_client;
pub mod upstream_pool;

pub use assembler::Assembler;
pub use conditional_cache::{ConditionalCache, ConditionalOutcome};
pub use dispatcher::{CacheStatus, Dispatcher, DispatcherConfig, DispatchOutcome};
pub use error::DispatchError;
pub use fetch_planner::{FetchPlanner, TileFetchGroup};
pub use rate_limiter::AmenityRateLimiter;
pub use tile_grid::TileGrid;
pub use tile_store::{CachedTile, MissOutcome, TileStore};
pub use upstream_client::{ProxyRequest, ProxyResponse, UpstreamClient};
pub use upstream_pool::{AcquireOutcome, UpstreamAttemptError, UpstreamPool};
