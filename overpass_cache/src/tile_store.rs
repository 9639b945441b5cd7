//! Redis-backed per-tile key/value store with TTL, SWR, and single-flight
//! locks (§4.3, §6.4).

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use overpass_core::types::{AmenityKey, OverpassResponse, Tile, TilePayload};

use crate::tile_grid::TileGrid;

/// A store read, wrapped with its freshness at the moment of the read.
pub struct CachedTile {
	pub payload: TilePayload,
	pub stale: bool,
}

/// The outcome of `with_miss_lock` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissOutcome {
	Fetched,
	Waited,
}

fn physical_ttl_ms(cache_ttl: StdDuration, swr_window: StdDuration) -> i64 {
	(cache_ttl + swr_window).as_millis() as i64
}

pub struct TileStore {
	conn: redis::aio::ConnectionManager,
	cache_ttl: StdDuration,
	swr_window: StdDuration,
	miss_lock_ttl: StdDuration,
}

impl TileStore {
	pub async fn connect(
		redis_url: &str,
		cache_ttl: StdDuration,
		swr_window: StdDuration,
		miss_lock_ttl: StdDuration,
	) -> Result<Self> {
		let client = redis::Client::open(redis_url).context("opening redis client")?;
		let conn = redis::aio::ConnectionManager::new(client).await.context("connecting to redis")?;
		Ok(TileStore { conn, cache_ttl, swr_window, miss_lock_ttl })
	}

	fn physical_ttl_ms(&self) -> i64 {
		physical_ttl_ms(self.cache_ttl, self.swr_window)
	}

	/// One `MGET` of all tile keys; decode failures are treated as misses,
	/// not errors. Returns only found entries.
	pub async fn read_tiles(&self, tiles: &[Tile], amenity: &AmenityKey) -> Result<HashMap<String, CachedTile>> {
		if tiles.is_empty() {
			return Ok(HashMap::new());
		}
		let keys: Vec<String> = tiles.iter().map(|t| TileGrid::tile_key(&t.hash, amenity)).collect();

		let mut conn = self.conn.clone();
		let values: Vec<Option<String>> =
			redis::cmd("MGET").arg(&keys).query_async(&mut conn).await.context("MGET tile keys")?;

		let now = Utc::now();
		let mut out = HashMap::new();
		for (tile, value) in tiles.iter().zip(values) {
			let Some(raw) = value else { continue };
			let Ok(payload) = serde_json::from_str::<TilePayload>(&raw) else {
				log::warn!("tile {} failed to decode; treating as miss", tile.hash);
				continue;
			};
			let stale = payload.is_stale(now);
			out.insert(tile.hash.clone(), CachedTile { payload, stale });
		}
		Ok(out)
	}

	pub async fn read_tile(&self, tile: &Tile, amenity: &AmenityKey) -> Result<Option<CachedTile>> {
		let mut map = self.read_tiles(std::slice::from_ref(tile), amenity).await?;
		Ok(map.remove(&tile.hash))
	}

	/// Pipelines a `SET ... PX <cacheTTL+swr>` per entry. A failure of any
	/// pipeline command raises; commands before the failure stand (§4.3).
	pub async fn write_tiles(&self, entries: &[(Tile, OverpassResponse)], amenity: &AmenityKey) -> Result<()> {
		if entries.is_empty() {
			return Ok(());
		}
		let now = Utc::now();
		let expires_at = now + ChronoDuration::milliseconds((self.cache_ttl.as_millis() as i64).max(0));
		let px = self.physical_ttl_ms();

		let mut pipe = redis::pipe();
		for (tile, response) in entries {
			let key = TileGrid::tile_key(&tile.hash, amenity);
			let payload = TilePayload::new(response.clone(), now, expires_at);
			let value = serde_json::to_string(&payload).context("encoding TilePayload")?;
			pipe.cmd("SET").arg(&key).arg(value).arg("PX").arg(px).ignore();
		}

		let mut conn = self.conn.clone();
		pipe.query_async::<()>(&mut conn).await.context("pipelined SET for tile writes")?;
		Ok(())
	}

	async fn try_lock(&self, key: &str, ttl: StdDuration) -> Result<bool> {
		let mut conn = self.conn.clone();
		let result: Option<String> =
			redis::cmd("SET").arg(key).arg("1").arg("NX").arg("PX").arg(ttl.as_millis() as i64).query_async(&mut conn).await.context("SET NX lock")?;
		Ok(result.is_some())
	}

	async fn release_lock(&self, key: &str) {
		let mut conn = self.conn.clone();
		if let Err(err) = redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn).await {
			log::warn!("failed to release lock {key}: {err}");
		}
	}

	/// `SET lockKey "1" PX swr*1000 NX`. If acquired, runs `handler` then
	/// deletes the lock regardless of outcome. If not acquired, returns
	/// immediately with no side effect — another refresher owns this tile.
	pub async fn with_refresh_lock<F, Fut>(&self, tile: &Tile, amenity: &AmenityKey, handler: F) -> Result<bool>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<()>>,
	{
		let key = format!("{}:lock", TileGrid::tile_key(&tile.hash, amenity));
		if !self.try_lock(&key, self.swr_window).await? {
			return Ok(false);
		}
		let result = handler().await;
		self.release_lock(&key).await;
		result?;
		Ok(true)
	}

	/// `SET inflightKey "1" PX ttlMs NX`. If acquired, runs `handler` and
	/// returns `Fetched`. If not, polls (50ms doubling to 400ms) for the
	/// tile to appear, bounded by the lock TTL, and returns `Waited`
	/// regardless of whether the tile materialized (§4.3).
	pub async fn with_miss_lock<F, Fut>(&self, tile: &Tile, amenity: &AmenityKey, handler: F) -> Result<MissOutcome>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<()>>,
	{
		let key = format!("{}:inflight", TileGrid::tile_key(&tile.hash, amenity));
		if self.try_lock(&key, self.miss_lock_ttl).await? {
			let result = handler().await;
			self.release_lock(&key).await;
			result?;
			return Ok(MissOutcome::Fetched);
		}

		let deadline = tokio::time::Instant::now() + self.miss_lock_ttl;
		let mut delay = StdDuration::from_millis(50);
		while tokio::time::Instant::now() < deadline {
			tokio::time::sleep(delay).await;
			if self.read_tile(tile, amenity).await?.is_some() {
				break;
			}
			delay = (delay * 2).min(StdDuration::from_millis(400));
		}
		Ok(MissOutcome::Waited)
	}
}
