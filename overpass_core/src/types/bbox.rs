use anyhow::{ensure, Result};

/// A geodetic bounding box: `{south, west, north, east}`, in degrees.
///
/// Invariant: `south <= north && west <= east`. There is no dateline
/// normalization — a box straddling +/-180 degrees is out of scope (see
/// spec §9, "Geohash dateline").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
	pub south: f64,
	pub west: f64,
	pub north: f64,
	pub east: f64,
}

impl BoundingBox {
	/// Build a validated bounding box from `(south, west, north, east)`.
	#[must_use = "BoundingBox::new returns a Result; handle the error or unwrap"]
	pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self> {
		let bbox = BoundingBox { south, west, north, east };
		bbox.checked()
	}

	fn checked(self) -> Result<Self> {
		ensure!(
			self.south.is_finite() && self.west.is_finite() && self.north.is_finite() && self.east.is_finite(),
			"bounding box coordinates must be finite: {self:?}"
		);
		ensure!(
			self.south <= self.north,
			"bounding box south ({}) must be <= north ({})",
			self.south,
			self.north
		);
		ensure!(
			self.west <= self.east,
			"bounding box west ({}) must be <= east ({})",
			self.west,
			self.east
		);
		Ok(self)
	}

	/// True if `(lat, lon)` falls inside this box, inclusive of the edges.
	pub fn contains(&self, lat: f64, lon: f64) -> bool {
		self.south <= lat && lat <= self.north && self.west <= lon && lon <= self.east
	}

	/// Returns the union of `self` and `other`.
	pub fn union(&self, other: &BoundingBox) -> BoundingBox {
		BoundingBox {
			south: self.south.min(other.south),
			west: self.west.min(other.west),
			north: self.north.max(other.north),
			east: self.east.max(other.east),
		}
	}

	/// Area in square degrees. Used by `FetchPlanner`'s area guard, not for
	/// any geodesic computation.
	pub fn area(&self) -> f64 {
		(self.north - self.south).max(0.0) * (self.east - self.west).max(0.0)
	}

	pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
		(self.south, self.west, self.north, self.east)
	}
}
