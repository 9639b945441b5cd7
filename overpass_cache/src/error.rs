//! `DispatchError` — the error *kinds* named in spec §7, hand-written so
//! `overpass_server` can pattern-match a kind onto an HTTP status code
//! without downcasting an `anyhow::Error`. Everything else in this crate
//! still returns `anyhow::Result`; this enum only exists at the seams that
//! need a stable discriminant.

use std::fmt;

#[derive(Debug)]
pub enum DispatchError {
	/// Missing query / missing bbox on a cacheable path → 400.
	ClientValidation(String),
	/// `|tiles| > maxTilesPerRequest` → 413, raised before any upstream traffic.
	TileOverflow { tile_count: usize },
	/// Every pool URL is in cooldown or quota-blocked.
	UpstreamUnavailable(String),
	/// Key/value store read/write failure.
	StoreError(String),
	/// Anything else — surfaces as 500 with no further detail to the client.
	Internal(anyhow::Error),
}

impl DispatchError {
	/// The `{"error": "..."}` message body text (§7, §6.1).
	pub fn message(&self) -> String {
		match self {
			DispatchError::ClientValidation(msg) => msg.clone(),
			DispatchError::TileOverflow { tile_count } => format!("Request requires {tile_count} tiles"),
			DispatchError::UpstreamUnavailable(_) => "Upstream error".to_string(),
			DispatchError::StoreError(_) => "Internal server error".to_string(),
			DispatchError::Internal(_) => "Internal server error".to_string(),
		}
	}
}

impl fmt::Display for DispatchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DispatchError::ClientValidation(msg) => write!(f, "client validation failed: {msg}"),
			DispatchError::TileOverflow { tile_count } => write!(f, "tile overflow: {tile_count} tiles requested"),
			DispatchError::UpstreamUnavailable(msg) => write!(f, "upstream unavailable: {msg}"),
			DispatchError::StoreError(msg) => write!(f, "store error: {msg}"),
			DispatchError::Internal(err) => write!(f, "internal error: {err}"),
		}
	}
}

impl std::error::Error for DispatchError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			DispatchError::Internal(err) => Some(err.as_ref()),
			_ => None,
		}
	}
}

impl From<anyhow::Error> for DispatchError {
	fn from(err: anyhow::Error) -> Self {
		DispatchError::Internal(err)
	}
}
