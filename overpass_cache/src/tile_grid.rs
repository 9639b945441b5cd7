//! Bounding-box → geohash tile decomposition (§4.2).

use overpass_core::types::{geohash_decode, geohash_encode, AmenityKey, BoundingBox, Tile};

/// Hard circuit breaker against pathological step sizes (e.g. a bbox so
/// large relative to `precision` that naive stepping would enumerate an
/// enormous number of cells). `Dispatcher` enforces the real tile budget
/// (§4.9 "Tile overflow") after this returns; this cap only exists so a
/// single call can't hang the process.
const MAX_TILES: usize = 200_000;

pub struct TileGrid;

impl TileGrid {
	/// The set of geohash cells at `precision` covering `bbox`, deduplicated
	/// by hash, each with its decoded bounds. Always returns at least one
	/// tile, even for a degenerate (zero-area) bbox.
	pub fn tiles_for(bbox: &BoundingBox, precision: usize) -> Vec<Tile> {
		let mut seen = std::collections::HashSet::new();
		let mut tiles = Vec::new();

		let (lat_step, lon_step) = geohash_encode(bbox.south, bbox.west, precision)
			.ok()
			.and_then(|h| geohash_decode(&h).ok())
			.map(|b| ((b.north - b.south).max(f64::EPSILON), (b.east - b.west).max(f64::EPSILON)))
			.unwrap_or((f64::EPSILON, f64::EPSILON));

		let mut lat = bbox.south;
		loop {
			let mut lon = bbox.west;
			loop {
				if let Ok(hash) = geohash_encode(lat, lon, precision) {
					if seen.insert(hash.clone()) {
						if let Ok(bounds) = geohash_decode(&hash) {
							tiles.push(Tile::new(hash, bounds));
						}
					}
				}
				if tiles.len() >= MAX_TILES || lon >= bbox.east {
					break;
				}
				lon = (lon + lon_step).min(bbox.east);
			}
			if tiles.len() >= MAX_TILES || lat >= bbox.north {
				break;
			}
			lat = (lat + lat_step).min(bbox.north);
		}

		tiles
	}

	/// `"tile:<amenityKey>:<hash>"` (§4.2).
	pub fn tile_key(hash: &str, amenity: &AmenityKey) -> String {
		format!("tile:{amenity}:{hash}")
	}
}
