//! Orchestrates the full cacheable-request pipeline (§2, §4.9):
//! classify → decompose → read → plan → fetch → assemble → emit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use overpass_core::types::{AmenityKey, OverpassResponse, TilePayload};
use overpass_core::QueryInspector;

use crate::assembler::Assembler;
use crate::conditional_cache::{ConditionalCache, ConditionalOutcome};
use crate::error::DispatchError;
use crate::fetch_planner::FetchPlanner;
use crate::tile_grid::TileGrid;
use crate::tile_store::{MissOutcome, TileStore};
use crate::upstream_client::UpstreamClient;

/// `X-Cache` values (§2, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
	Hit,
	Stale,
	Miss,
}

impl CacheStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			CacheStatus::Hit => "HIT",
			CacheStatus::Stale => "STALE",
			CacheStatus::Miss => "MISS",
		}
	}
}

/// What the caller (`overpass_server`) should do with a query.
pub enum DispatchOutcome {
	/// Not a cacheable query shape (or `TRANSPARENT_ONLY`): forward verbatim.
	PassThrough,
	/// `304 Not Modified`: no body, no `X-Cache` (§6.1).
	NotModified { etag: String },
	/// `200 application/json` with the assembled response.
	Served { etag: String, cache_status: CacheStatus, body: OverpassResponse },
}

pub struct DispatcherConfig {
	pub tile_precision: usize,
	pub upstream_tile_precision: usize,
	pub max_tiles_per_request: usize,
	pub max_concurrent_refreshes: usize,
	pub transparent_only: bool,
}

pub struct Dispatcher {
	config: DispatcherConfig,
	tile_store: Arc<TileStore>,
	upstream_client: Arc<UpstreamClient>,
	refresh_semaphore: Arc<Semaphore>,
	/// Background refresh tasks, tracked so the owning server can drain them
	/// on graceful shutdown (§9 "Background refreshes outliving their
	/// request") without the originating request awaiting them.
	background: Arc<Mutex<JoinSet<()>>>,
}

impl Dispatcher {
	pub fn new(config: DispatcherConfig, tile_store: Arc<TileStore>, upstream_client: Arc<UpstreamClient>) -> Self {
		let refresh_semaphore = Arc::new(Semaphore::new(config.max_concurrent_refreshes));
		Dispatcher { config, tile_store, upstream_client, refresh_semaphore, background: Arc::new(Mutex::new(JoinSet::new())) }
	}

	/// Blocks until all spawned background refreshes have completed. Intended
	/// for graceful shutdown, not the request path.
	pub async fn drain_background_refreshes(&self) {
		let mut set = self.background.lock().await;
		while set.join_next().await.is_some() {}
	}

	pub async fn dispatch(
		&self,
		query: Option<&str>,
		amenity_param: Option<&str>,
		if_none_match: Option<&str>,
	) -> Result<DispatchOutcome, DispatchError> {
		if self.config.transparent_only {
			return Ok(DispatchOutcome::PassThrough);
		}

		let Some(query) = query else {
			return Err(DispatchError::ClientValidation("Query payload required".to_string()));
		};

		if !QueryInspector::has_json_output(query) || !QueryInspector::has_amenity_filter(query) {
			return Ok(DispatchOutcome::PassThrough);
		}

		let Some(bbox) = QueryInspector::extract_bounding_box(query) else {
			return Err(DispatchError::ClientValidation("Bounding box required".to_string()));
		};

		let amenity = QueryInspector::extract_amenity_value(query)
			.or_else(|| amenity_param.and_then(|raw| AmenityKey::normalize(raw).ok()))
			.unwrap_or_else(AmenityKey::default_toilets);

		let tiles = TileGrid::tiles_for(&bbox, self.config.tile_precision);
		if tiles.len() > self.config.max_tiles_per_request {
			return Err(DispatchError::TileOverflow { tile_count: tiles.len() });
		}

		let cached = self.tile_store.read_tiles(&tiles, &amenity).await.map_err(|e| DispatchError::StoreError(e.to_string()))?;

		let mut fresh_payloads = Vec::new();
		let mut stale_tiles = Vec::new();
		let mut missing_tiles = Vec::new();
		for tile in &tiles {
			match cached.get(&tile.hash) {
				Some(entry) if !entry.stale => fresh_payloads.push(entry.payload.clone()),
				Some(entry) => {
					stale_tiles.push(tile.clone());
					fresh_payloads.push(entry.payload.clone());
				}
				None => missing_tiles.push(tile.clone()),
			}
		}

		let cache_status = if !missing_tiles.is_empty() {
			CacheStatus::Miss
		} else if !stale_tiles.is_empty() {
			CacheStatus::Stale
		} else {
			CacheStatus::Hit
		};

		self.submit_background_refreshes(stale_tiles, amenity.clone()).await;

		let miss_payloads = self.resolve_missing(missing_tiles, &amenity).await?;
		fresh_payloads.extend(miss_payloads);

		let combined = Assembler::combine(&fresh_payloads, &bbox);
		let etag_payload = Self::synthetic_etag_payload(&fresh_payloads, combined.clone());

		match ConditionalCache::apply_conditional(if_none_match, &etag_payload).map_err(DispatchError::from)? {
			ConditionalOutcome::NotModified { etag } => Ok(DispatchOutcome::NotModified { etag }),
			ConditionalOutcome::Send { etag } => Ok(DispatchOutcome::Served { etag, cache_status, body: combined }),
		}
	}

	/// A deterministic stand-in `TilePayload` used only to compute the
	/// response-level ETag: its `fetched_at`/`expires_at` are the minimum
	/// across all contributing tiles, so re-assembling identical store
	/// content (scenario 2's immediate repeat request) yields the same
	/// ETag rather than one that drifts with wall-clock "now".
	fn synthetic_etag_payload(contributing: &[TilePayload], response: OverpassResponse) -> TilePayload {
		let epoch = DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is representable");
		let fetched_at = contributing.iter().map(|p| p.fetched_at).min().unwrap_or(epoch);
		let expires_at = contributing.iter().map(|p| p.expires_at).min().unwrap_or(epoch);
		TilePayload::new(response, fetched_at, expires_at)
	}

	async fn submit_background_refreshes(&self, stale_tiles: Vec<overpass_core::types::Tile>, amenity: AmenityKey) {
		if stale_tiles.is_empty() {
			return;
		}
		let groups = FetchPlanner::plan(&stale_tiles, self.config.upstream_tile_precision, self.config.tile_precision, None);

		let mut set = self.background.lock().await;
		for group in groups {
			let store = self.tile_store.clone();
			let client = self.upstream_client.clone();
			let semaphore = self.refresh_semaphore.clone();
			let amenity = amenity.clone();

			set.spawn(async move {
				let Ok(_permit) = semaphore.acquire_owned().await else { return };
				let Some(lock_tile) = group.tiles.first().cloned() else { return };
				let group_tiles = group.tiles.clone();
				let bounds = group.bounds;

				let outcome = store
					.with_refresh_lock(&lock_tile, &amenity, || async move {
						let response = client.fetch_tile(&bounds, &amenity).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
						let entries: Vec<_> = group_tiles.into_iter().map(|t| (t, response.clone())).collect();
						store.write_tiles(&entries, &amenity).await
					})
					.await;

				if let Err(err) = outcome {
					log::warn!("background refresh failed for tile {}: {err:#}", lock_tile.hash);
				}
			});
		}
	}

	/// For each missing group, acquires the miss-lock (keyed by the group's
	/// first tile), fetches and writes on acquisition, then re-reads every
	/// fine tile in the group. Still-absent tiles are logged and omitted
	/// (§4.9 "Miss handling").
	async fn resolve_missing(&self, missing_tiles: Vec<overpass_core::types::Tile>, amenity: &AmenityKey) -> Result<Vec<TilePayload>, DispatchError> {
		if missing_tiles.is_empty() {
			return Ok(Vec::new());
		}
		let groups = FetchPlanner::plan(&missing_tiles, self.config.upstream_tile_precision, self.config.tile_precision, None);

		let mut resolved = Vec::new();
		for group in groups {
			let Some(lock_tile) = group.tiles.first().cloned() else { continue };
			let group_tiles = group.tiles.clone();
			let bounds = group.bounds;
			let store = self.tile_store.clone();
			let client = self.upstream_client.clone();
			let amenity_for_handler = amenity.clone();

			let _outcome: MissOutcome = self
				.tile_store
				.with_miss_lock(&lock_tile, amenity, || async move {
					let response = client.fetch_tile(&bounds, &amenity_for_handler).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
					let entries: Vec<_> = group_tiles.into_iter().map(|t| (t, response.clone())).collect();
					store.write_tiles(&entries, &amenity_for_handler).await
				})
				.await
				.map_err(|e| DispatchError::StoreError(e.to_string()))?;

			for tile in &group.tiles {
				match self.tile_store.read_tile(tile, amenity).await.map_err(|e| DispatchError::StoreError(e.to_string()))? {
					Some(entry) => resolved.push(entry.payload),
					None => log::warn!("tile {} still absent after miss-lock resolution; omitting", tile.hash),
				}
			}
		}
		Ok(resolved)
	}
}
