//! Merges tile payloads into one response (§4.7).

use std::collections::HashMap;

use overpass_core::types::{BoundingBox, ElementKind, OverpassElement, OverpassResponse, TilePayload};

pub struct Assembler;

impl Assembler {
	/// Envelope from the first payload; elements deduped by `(kind, id)`
	/// with later-writer-wins; nodes outside `bbox` (or with non-numeric
	/// lat/lon) dropped; ways and relations retained unconditionally.
	/// Idempotent and order-independent modulo the envelope (§4.7).
	pub fn combine(payloads: &[TilePayload], bbox: &BoundingBox) -> OverpassResponse {
		let mut envelope = OverpassResponse::empty();
		if let Some(first) = payloads.first() {
			envelope.version = first.response.version;
			envelope.generator = first.response.generator.clone();
			envelope.osm3s = first.response.osm3s.clone();
		}

		let mut by_key: HashMap<(ElementKind, i64), OverpassElement> = HashMap::new();
		for payload in payloads {
			for element in &payload.response.elements {
				by_key.insert(element.dedup_key(), element.clone());
			}
		}

		let mut elements: Vec<OverpassElement> = by_key
			.into_values()
			.filter(|element| match element.kind() {
				ElementKind::Node => element.coordinates().is_some_and(|(lat, lon)| bbox.contains(lat, lon)),
				ElementKind::Way | ElementKind::Relation => true,
			})
			.collect();

		// Deterministic output ordering: (kind, id) ascending. `by_key` is a
		// HashMap, so iteration order is otherwise unspecified.
		elements.sort_by_key(|e| (e.kind() as u8, e.id()));

		envelope.elements = elements;
		envelope
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use std::collections::HashMap as StdHashMap;

	fn node(id: i64, lat: f64, lon: f64) -> OverpassElement {
		OverpassElement::Node { id, lat: Some(lat), lon: Some(lon), tags: StdHashMap::new() }
	}

	fn payload(elements: Vec<OverpassElement>) -> TilePayload {
		let now = Utc::now();
		let mut response = OverpassResponse::empty();
		response.elements = elements;
		TilePayload::new(response, now, now)
	}

	#[test]
	fn dedups_by_kind_and_id_with_later_writer_winning() {
		let bbox = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
		let mut tags_a = StdHashMap::new();
		tags_a.insert("amenity".to_string(), "cafe".to_string());
		let a = OverpassElement::Node { id: 1, lat: Some(1.0), lon: Some(1.0), tags: tags_a };
		let mut tags_b = StdHashMap::new();
		tags_b.insert("amenity".to_string(), "updated".to_string());
		let b = OverpassElement::Node { id: 1, lat: Some(1.0), lon: Some(1.0), tags: tags_b };

		let combined = Assembler::combine(&[payload(vec![a]), payload(vec![b])], &bbox);
		assert_eq!(combined.elements.len(), 1);
		assert_eq!(combined.elements[0].tags().get("amenity"), Some(&"updated".to_string()));
	}

	#[test]
	fn nodes_outside_bbox_are_dropped() {
		let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
		let inside = node(1, 0.5, 0.5);
		let outside = node(2, 50.0, 50.0);
		let combined = Assembler::combine(&[payload(vec![inside, outside])], &bbox);
		assert_eq!(combined.elements.len(), 1);
		assert_eq!(combined.elements[0].id(), 1);
	}

	#[test]
	fn nodes_with_missing_coordinates_are_dropped() {
		let bbox = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
		let no_coords = OverpassElement::Node { id: 1, lat: None, lon: None, tags: StdHashMap::new() };
		let combined = Assembler::combine(&[payload(vec![no_coords])], &bbox);
		assert!(combined.elements.is_empty());
	}

	#[test]
	fn ways_and_relations_are_retained_unconditionally() {
		let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
		let way = OverpassElement::Way { id: 1, nodes: vec![999], tags: StdHashMap::new() };
		let combined = Assembler::combine(&[payload(vec![way])], &bbox);
		assert_eq!(combined.elements.len(), 1);
	}

	#[test]
	fn combine_is_idempotent_as_a_set() {
		let bbox = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
		let elements = vec![node(1, 1.0, 1.0), node(2, 2.0, 2.0)];
		let once = Assembler::combine(&[payload(elements.clone())], &bbox);
		let twice = Assembler::combine(&[payload(once.elements.clone())], &bbox);
		assert_eq!(once.elements, twice.elements);
	}

	#[test]
	fn combine_of_empty_payload_set_is_empty_envelope() {
		let bbox = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
		let combined = Assembler::combine(&[], &bbox);
		assert!(combined.elements.is_empty());
		assert!(combined.generator.is_none());
	}
}
