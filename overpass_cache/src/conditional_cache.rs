//! Weak-ETag negotiation (§4.8).

use anyhow::Result;
use overpass_core::types::TilePayload;
use overpass_core::weak_etag;

pub struct ConditionalCache;

/// The outcome of `apply_conditional`.
pub enum ConditionalOutcome {
	/// `If-None-Match` matched: emit `304` with no body.
	NotModified { etag: String },
	/// No match: continue sending the full body, stamped with this etag.
	Send { etag: String },
}

impl ConditionalCache {
	/// Computes the weak etag for `payload`, splits `if_none_match` on
	/// commas, trims each element, and if any equals the etag returns
	/// `NotModified`; otherwise `Send` (§4.8).
	pub fn apply_conditional(if_none_match: Option<&str>, payload: &TilePayload) -> Result<ConditionalOutcome> {
		let etag = weak_etag(payload)?;

		let matched = if_none_match.is_some_and(|header| header.split(',').map(str::trim).any(|candidate| candidate == etag));

		Ok(if matched { ConditionalOutcome::NotModified { etag } } else { ConditionalOutcome::Send { etag } })
	}
}
