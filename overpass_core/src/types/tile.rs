use super::BoundingBox;

/// A single geohash cell: its hash string and the bounds it decodes to.
/// Tile hashes are unique within a request at a given precision (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
	pub hash: String,
	pub bounds: BoundingBox,
}

impl Tile {
	pub fn new(hash: String, bounds: BoundingBox) -> Self {
		Tile { hash, bounds }
	}

	/// The store key for this tile under a given amenity (§4.2 `tileKey`).
	pub fn store_key(&self, amenity: &super::AmenityKey) -> String {
		format!("tile:{amenity}:{}", self.hash)
	}
}
