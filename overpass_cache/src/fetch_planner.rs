//! Groups fine tiles into coarse upstream fetch rectangles (§4.4).

use std::collections::BTreeMap;

use overpass_core::types::{BoundingBox, Tile};

/// A group of fine tiles to fetch in a single upstream request, plus the
/// union of their bounds.
#[derive(Debug, Clone)]
pub struct TileFetchGroup {
	pub bounds: BoundingBox,
	pub tiles: Vec<Tile>,
}

pub struct FetchPlanner;

impl FetchPlanner {
	/// `32^(finePrecision - coarsePrecision) / 8`, clamped to `[8, 256]`.
	pub fn default_target_tiles_per_request(fine_precision: usize, coarse_precision: usize) -> usize {
		let diff = fine_precision.saturating_sub(coarse_precision) as i32;
		let raw = 32f64.powi(diff) / 8.0;
		(raw.round() as usize).clamp(8, 256)
	}

	/// Partition `tiles` by `coarsePrecision`-length hash prefix, then group
	/// adjacent (Z-order-sorted) tiles within each coarse bucket into runs
	/// bounded by `target_tiles_per_request` and an area guard.
	pub fn plan(
		tiles: &[Tile],
		coarse_precision: usize,
		fine_precision: usize,
		target_tiles_per_request: Option<usize>,
	) -> Vec<TileFetchGroup> {
		let target = target_tiles_per_request
			.unwrap_or_else(|| Self::default_target_tiles_per_request(fine_precision, coarse_precision));

		let mut buckets: BTreeMap<String, Vec<Tile>> = BTreeMap::new();
		for tile in tiles {
			let prefix: String = tile.hash.chars().take(coarse_precision).collect();
			buckets.entry(prefix).or_default().push(tile.clone());
		}

		let mut groups = Vec::new();
		for (_, mut bucket_tiles) in buckets {
			bucket_tiles.sort_by(|a, b| a.hash.cmp(&b.hash));

			let mut current: Vec<Tile> = Vec::new();
			let mut current_bounds: Option<BoundingBox> = None;
			let mut max_tile_area = 0.0_f64;

			for tile in bucket_tiles {
				if !current.is_empty() {
					let bounds = current_bounds.expect("current_bounds set whenever current is non-empty");
					let candidate_bounds = bounds.union(&tile.bounds);
					let area_guard = target as f64 * max_tile_area;
					let should_split = current.len() >= target || candidate_bounds.area() > area_guard;
					if should_split {
						groups.push(TileFetchGroup { bounds, tiles: std::mem::take(&mut current) });
						current_bounds = None;
						max_tile_area = 0.0;
					}
				}

				current_bounds = Some(match current_bounds {
					Some(b) => b.union(&tile.bounds),
					None => tile.bounds,
				});
				max_tile_area = max_tile_area.max(tile.bounds.area());
				current.push(tile);
			}

			if !current.is_empty() {
				groups.push(TileFetchGroup {
					bounds: current_bounds.expect("current_bounds set whenever current is non-empty"),
					tiles: current,
				});
			}
		}

		groups.sort_by(|a, b| a.bounds.as_tuple().partial_cmp(&b.bounds.as_tuple()).unwrap_or(std::cmp::Ordering::Equal));
		groups
	}
}
