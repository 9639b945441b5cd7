//! Weak ETag computation over a `TilePayload` (§4.8).

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};

use crate::types::TilePayload;

/// Re-serializes `value` with object keys in sorted order, recursively, so
/// that two structurally-equal payloads with different field order hash the
/// same way. `serde_json`'s default map is insertion-ordered, so this can't
/// rely on `to_string` alone.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
	match value {
		serde_json::Value::Object(map) => {
			let sorted: BTreeMap<&String, serde_json::Value> =
				map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
			serde_json::Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
		}
		serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonicalize).collect()),
		other => other.clone(),
	}
}

fn canonical_json(payload: &TilePayload) -> Result<String> {
	let value = serde_json::to_value(payload).context("serializing TilePayload for canonical JSON")?;
	let canonical = canonicalize(&value);
	serde_json::to_string(&canonical).context("writing canonical JSON")
}

/// `weakEtag(payload) := "W/\"" + hex(sha1(canonicalJson(payload))) + "\""` (§4.8).
pub fn weak_etag(payload: &TilePayload) -> Result<String> {
	let canonical = canonical_json(payload)?;
	let digest = Sha1::digest(canonical.as_bytes());
	Ok(format!("W/\"{}\"", hex::encode(digest)))
}

/// Lower-case hex encoding of a byte slice.
mod hex {
	pub fn encode(bytes: impl AsRef<[u8]>) -> String {
		use std::fmt::Write;
		let mut out = String::with_capacity(bytes.as_ref().len() * 2);
		for byte in bytes.as_ref() {
			write!(out, "{byte:02x}").unwrap();
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::OverpassResponse;
	use chrono::{TimeZone, Utc};

	fn payload(generator: Option<&str>) -> TilePayload {
		let fetched = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		let expires = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
		let mut response = OverpassResponse::empty();
		response.generator = generator.map(str::to_string);
		TilePayload::new(response, fetched, expires)
	}

	#[test]
	fn etag_is_stable_for_the_same_payload() {
		let p = payload(Some("overpass"));
		assert_eq!(weak_etag(&p).unwrap(), weak_etag(&p).unwrap());
	}

	#[test]
	fn etag_differs_for_structurally_different_payloads() {
		let a = payload(Some("overpass"));
		let b = payload(Some("other"));
		assert_ne!(weak_etag(&a).unwrap(), weak_etag(&b).unwrap());
	}

	#[test]
	fn etag_has_weak_prefix_and_quotes() {
		let tag = weak_etag(&payload(None)).unwrap();
		assert!(tag.starts_with("W/\""));
		assert!(tag.ends_with('"'));
	}
}
