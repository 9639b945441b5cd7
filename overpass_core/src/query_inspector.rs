//! Pure classification of raw Overpass query text (§4.1). None of these
//! functions touch the network or the store — the Dispatcher (in
//! `overpass_cache`) is the only caller that sequences them.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{AmenityKey, BoundingBox};

fn json_output_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(?i)out\s*:\s*json").unwrap())
}

fn amenity_filter_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"(?i)\[\s*(['"]?)amenity\1\s*="#).unwrap())
}

fn amenity_value_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"(?i)\[\s*(['"]?)amenity\1\s*=\s*(['"]?)([^'"\]]*)\2\s*\]"#).unwrap())
}

fn bbox_directive_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(
			r"(?i)\[\s*bbox\s*:\s*(-?[0-9]+(?:\.[0-9]+)?)\s*,\s*(-?[0-9]+(?:\.[0-9]+)?)\s*,\s*(-?[0-9]+(?:\.[0-9]+)?)\s*,\s*(-?[0-9]+(?:\.[0-9]+)?)\s*\]",
		)
		.unwrap()
	})
}

fn paren_group_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\(([^()]*)\)").unwrap())
}

/// Strips `/* ... */`, `// ...`, `-- ...`, and `# ...` comments, per §4.1's
/// `extractBoundingBox`/`extractAmenityValue` contract. `hasJsonOutput` and
/// `hasAmenityFilter` deliberately do NOT call this (§9 Open Question:
/// "`out:json` detection lexical scope" — low-impact, left unfixed).
fn strip_comments(q: &str) -> String {
	static BLOCK: OnceLock<Regex> = OnceLock::new();
	static LINE: OnceLock<Regex> = OnceLock::new();
	let block = BLOCK.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
	let line = LINE.get_or_init(|| Regex::new(r"(?m)(//|--|#).*$").unwrap());
	let without_block = block.replace_all(q, "");
	line.replace_all(&without_block, "").into_owned()
}

/// Namespace for the four pure query-classification functions.
pub struct QueryInspector;

impl QueryInspector {
	/// True iff `q` matches, case-insensitively, `out : json` (whitespace
	/// around the colon tolerated).
	pub fn has_json_output(q: &str) -> bool {
		json_output_re().is_match(q)
	}

	/// True iff `q` contains an `[amenity…]` predicate, tolerating
	/// single/double/unquoted key spelling.
	pub fn has_amenity_filter(q: &str) -> bool {
		amenity_filter_re().is_match(q)
	}

	/// The value inside `["amenity"="<value>"]`, after stripping comments.
	/// An empty value yields `None`.
	pub fn extract_amenity_value(q: &str) -> Option<AmenityKey> {
		let cleaned = strip_comments(q);
		let captures = amenity_value_re().captures(&cleaned)?;
		let value = captures.get(3)?.as_str();
		AmenityKey::normalize(value).ok()
	}

	/// Strips comments, then looks first for a `[bbox:<nums>]` directive and
	/// second for any parenthesized four-number tuple. The first match wins.
	pub fn extract_bounding_box(q: &str) -> Option<BoundingBox> {
		let cleaned = strip_comments(q);

		if let Some(captures) = bbox_directive_re().captures(&cleaned) {
			let nums: Vec<f64> = (1..=4).filter_map(|i| captures.get(i)?.as_str().parse().ok()).collect();
			if nums.len() == 4 {
				if let Ok(bbox) = BoundingBox::new(nums[0], nums[1], nums[2], nums[3]) {
					return Some(bbox);
				}
			}
		}

		for group in paren_group_re().captures_iter(&cleaned) {
			let Some(inner) = group.get(1) else { continue };
			let tokens: Vec<&str> = inner.as_str().split(',').map(str::trim).collect();
			if tokens.len() != 4 {
				// Bare `node(a,b,c)` with three numbers must not match (§4.1).
				continue;
			}
			let nums: Option<Vec<f64>> = tokens.iter().map(|t| t.parse::<f64>().ok()).collect();
			let Some(nums) = nums else { continue };
			if let Ok(bbox) = BoundingBox::new(nums[0], nums[1], nums[2], nums[3]) {
				return Some(bbox);
			}
		}

		None
	}
}
