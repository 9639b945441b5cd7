use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `type` discriminant Overpass uses for elements and relation members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
	Node,
	Way,
	Relation,
}

/// One entry in a `relation`'s member list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRef {
	#[serde(rename = "type")]
	pub kind: ElementKind,
	#[serde(rename = "ref")]
	pub r#ref: i64,
	#[serde(default)]
	pub role: String,
}

/// A single Overpass element: a node, way, or relation, tagged by `type`.
///
/// Mirrors the on-the-wire Overpass JSON shape directly so `serde_json`
/// round-trips it without a custom (de)serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
	Node {
		id: i64,
		#[serde(skip_serializing_if = "Option::is_none")]
		lat: Option<f64>,
		#[serde(skip_serializing_if = "Option::is_none")]
		lon: Option<f64>,
		#[serde(default)]
		tags: HashMap<String, String>,
	},
	Way {
		id: i64,
		#[serde(default)]
		nodes: Vec<i64>,
		#[serde(default)]
		tags: HashMap<String, String>,
	},
	Relation {
		id: i64,
		#[serde(default)]
		members: Vec<MemberRef>,
		#[serde(default)]
		tags: HashMap<String, String>,
	},
}

impl OverpassElement {
	pub fn kind(&self) -> ElementKind {
		match self {
			OverpassElement::Node { .. } => ElementKind::Node,
			OverpassElement::Way { .. } => ElementKind::Way,
			OverpassElement::Relation { .. } => ElementKind::Relation,
		}
	}

	pub fn id(&self) -> i64 {
		match self {
			OverpassElement::Node { id, .. }
			| OverpassElement::Way { id, .. }
			| OverpassElement::Relation { id, .. } => *id,
		}
	}

	/// The `(kind, id)` pair the Assembler dedups on (§4.7).
	pub fn dedup_key(&self) -> (ElementKind, i64) {
		(self.kind(), self.id())
	}

	pub fn tags(&self) -> &HashMap<String, String> {
		match self {
			OverpassElement::Node { tags, .. }
			| OverpassElement::Way { tags, .. }
			| OverpassElement::Relation { tags, .. } => tags,
		}
	}

	/// `Some((lat, lon))` for a node with finite, numeric coordinates.
	/// Used by the Assembler's bbox filter (§4.7): nodes with non-numeric
	/// lat/lon are dropped, so a `None` here means "drop this node".
	pub fn coordinates(&self) -> Option<(f64, f64)> {
		match self {
			OverpassElement::Node { lat: Some(lat), lon: Some(lon), .. }
				if lat.is_finite() && lon.is_finite() =>
			{
				Some((*lat, *lon))
			}
			_ => None,
		}
	}
}

/// Envelope returned by Overpass: opaque metadata plus the element list.
/// `osm3s` is passed through untouched — its shape is not specified upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverpassResponse {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub version: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub generator: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub osm3s: Option<serde_json::Value>,
	#[serde(default)]
	pub elements: Vec<OverpassElement>,
}

impl OverpassResponse {
	/// An empty envelope with no elements, used when assembling from zero payloads.
	pub fn empty() -> Self {
		OverpassResponse { version: None, generator: None, osm3s: None, elements: Vec::new() }
	}
}

/// The value stored at `tile:<amenityKey>:<hash>` (§3, §6.4).
///
/// Invariant: `fetched_at <= expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePayload {
	pub response: OverpassResponse,
	#[serde(rename = "fetchedAt")]
	pub fetched_at: DateTime<Utc>,
	#[serde(rename = "expiresAt")]
	pub expires_at: DateTime<Utc>,
}

impl TilePayload {
	pub fn new(response: OverpassResponse, fetched_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
		TilePayload { response, fetched_at, expires_at }
	}

	/// `stale := now > expiresAt` (§3).
	pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
		now > self.expires_at
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn sample_node(id: i64, lat: f64, lon: f64) -> OverpassElement {
		OverpassElement::Node { id, lat: Some(lat), lon: Some(lon), tags: HashMap::new() }
	}

	#[test]
	fn dedup_key_distinguishes_kind_not_just_id() {
		let node = sample_node(1, 0.0, 0.0);
		let way = OverpassElement::Way { id: 1, nodes: vec![], tags: HashMap::new() };
		assert_ne!(node.dedup_key(), way.dedup_key());
	}

	#[test]
	fn coordinates_none_for_missing_lat_lon() {
		let node = OverpassElement::Node { id: 1, lat: None, lon: None, tags: HashMap::new() };
		assert_eq!(node.coordinates(), None);
	}

	#[test]
	fn coordinates_some_for_well_formed_node() {
		let node = sample_node(1, 52.5, 13.4);
		assert_eq!(node.coordinates(), Some((52.5, 13.4)));
	}

	#[test]
	fn way_and_relation_have_no_coordinates() {
		let way = OverpassElement::Way { id: 1, nodes: vec![], tags: HashMap::new() };
		let relation = OverpassElement::Relation { id: 1, members: vec![], tags: HashMap::new() };
		assert_eq!(way.coordinates(), None);
		assert_eq!(relation.coordinates(), None);
	}

	#[test]
	fn stale_iff_now_past_expiry() {
		let fetched = Utc::now();
		let expires = fetched + Duration::seconds(60);
		let payload = TilePayload::new(OverpassResponse::empty(), fetched, expires);
		assert!(!payload.is_stale(fetched));
		assert!(payload.is_stale(expires + Duration::seconds(1)));
	}

	#[test]
	fn element_roundtrips_through_overpass_json_shape() {
		let json = serde_json::json!({
			"type": "node",
			"id": 42,
			"lat": 52.5,
			"lon": 13.4,
			"tags": {"amenity": "cafe"}
		});
		let element: OverpassElement = serde_json::from_value(json).unwrap();
		assert_eq!(element.kind(), ElementKind::Node);
		assert_eq!(element.id(), 42);
	}

	#[test]
	fn relation_member_roundtrips() {
		let json = serde_json::json!({
			"type": "relation",
			"id": 7,
			"members": [{"type": "way", "ref": 3, "role": "outer"}],
			"tags": {}
		});
		let element: OverpassElement = serde_json::from_value(json).unwrap();
		match element {
			OverpassElement::Relation { members, .. } => {
				assert_eq!(members[0].kind, ElementKind::Way);
				assert_eq!(members[0].r#ref, 3);
				assert_eq!(members[0].role, "outer");
			}
			_ => panic!("expected relation"),
		}
	}
}
