//! # overpass_core
//!
//! Transport-agnostic types and pure functions shared by the Overpass
//! tile-caching reverse proxy.
//!
//! This crate has no knowledge of HTTP, redis, or process configuration — it
//! only knows how to classify a query, decompose a bounding box into tiles,
//! and describe the Overpass data model. The ambient stack (HTTP server,
//! key/value store, upstream pool) lives in `overpass_cache` and
//! `overpass_server`.

pub mod etag;
pub mod query_inspector;
pub mod types;

pub use etag::weak_etag;
pub use query_inspector::QueryInspector;
pub use types::{
	AmenityKey, BoundingBox, OverpassElement, OverpassResponse, Tile, TilePayload,
};
