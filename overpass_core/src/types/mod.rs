//! Core data model: §3 of the specification.

mod amenity;
mod bbox;
mod geohash;
mod overpass;
mod tile;

pub use amenity::AmenityKey;
pub use bbox::BoundingBox;
pub use geohash::{decode as geohash_decode, encode as geohash_encode};
pub use overpass::{
	ElementKind, MemberRef, OverpassElement, OverpassResponse, TilePayload,
};
pub use tile::Tile;
