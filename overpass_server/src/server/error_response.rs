//! Maps `DispatchError` kinds onto HTTP status codes and `{"error": ...}`
//! bodies (§7). The mapping is context-dependent for `UpstreamUnavailable`:
//! a cacheable request that exhausts the upstream pool is an internal
//! failure from the caller's point of view (500), while a pass-through
//! request that exhausts it is a `502 Bad Gateway` naming the upstream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use overpass_cache::DispatchError;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
	(status, Json(ErrorBody { error: message.into() })).into_response()
}

/// For errors raised while serving a cacheable `/api/interpreter` request.
pub fn cacheable_error_response(err: &DispatchError) -> Response {
	log::warn!("cacheable request failed: {err}");
	match err {
		DispatchError::ClientValidation(msg) => error_json(StatusCode::BAD_REQUEST, msg.clone()),
		DispatchError::TileOverflow { .. } => error_json(StatusCode::PAYLOAD_TOO_LARGE, err.message()),
		DispatchError::UpstreamUnavailable(_) | DispatchError::StoreError(_) | DispatchError::Internal(_) => {
			error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
		}
	}
}

/// For errors raised while forwarding a pass-through request (§4.6).
pub fn pass_through_error_response(err: &DispatchError) -> Response {
	log::warn!("pass-through request failed: {err}");
	error_json(StatusCode::BAD_GATEWAY, "Upstream error")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_validation_is_400() {
		let resp = cacheable_error_response(&DispatchError::ClientValidation("Query payload required".to_string()));
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}

	#[test]
	fn tile_overflow_is_413() {
		let resp = cacheable_error_response(&DispatchError::TileOverflow { tile_count: 5000 });
		assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
	}

	#[test]
	fn upstream_unavailable_is_500_on_cacheable_path() {
		let resp = cacheable_error_response(&DispatchError::UpstreamUnavailable("all blocked".to_string()));
		assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn upstream_unavailable_is_502_on_pass_through_path() {
		let resp = pass_through_error_response(&DispatchError::UpstreamUnavailable("all blocked".to_string()));
		assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
	}
}
