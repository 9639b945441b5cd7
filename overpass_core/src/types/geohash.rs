//! Thin wrapper around the `geohash` crate (base-32 Niemeyer encoding),
//! translating between this crate's `BoundingBox`/`(lat, lon)` shapes and
//! the crate's `geo_types::Coord`/`Rect`.

use anyhow::{Context, Result};
use geo_types::Coord;

use super::BoundingBox;

/// Encode `(lat, lon)` to a geohash string of exactly `precision` characters.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String> {
	geohash::encode(Coord { x: lon, y: lat }, precision).context("encoding geohash")
}

/// Decode a geohash string to the `BoundingBox` it covers.
pub fn decode(hash: &str) -> Result<BoundingBox> {
	let rect = geohash::decode_bbox(hash).context("decoding geohash")?;
	let min = rect.min();
	let max = rect.max();
	BoundingBox::new(min.y, min.x, max.y, max.x)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classic_ezs42_example() {
		let hash = encode(42.605, -5.603, 5).unwrap();
		assert_eq!(hash, "ezs42");
	}

	#[test]
	fn decode_of_encode_contains_original_point() {
		let lat = 52.52;
		let lon = 13.405;
		let hash = encode(lat, lon, 9).unwrap();
		let bbox = decode(&hash).unwrap();
		assert!(bbox.contains(lat, lon));
	}

	#[test]
	fn longer_precision_yields_smaller_cell() {
		let lat = 52.52;
		let lon = 13.405;
		let short = decode(&encode(lat, lon, 3).unwrap()).unwrap();
		let long = decode(&encode(lat, lon, 7).unwrap()).unwrap();
		assert!(long.area() < short.area());
	}

	#[test]
	fn rejects_invalid_character() {
		assert!(decode("a").is_err());
	}
}
