//! The `/api/interpreter` handler: extracts the query/amenity from the
//! request, dispatches into `overpass_cache::Dispatcher`, and turns the
//! outcome into a response. Grounded on
//! `versatiles::server::handlers::serve_tile_from_source`'s shape (thin
//! handler matching an `Ok`/`Ok(None)`/`Err` outcome onto a response).

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use overpass_cache::{CacheStatus, DispatchOutcome};

use super::error_response::cacheable_error_response;
use super::ingress::RequestBody;
use super::AppState;
use crate::proxy;

pub async fn interpreter(State(state): State<AppState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
	let query_params = parse_query_params(uri.query());
	let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());

	let (query, amenity_param) = if method == Method::GET {
		let query = query_params.get("data").or_else(|| query_params.get("q")).cloned();
		(query, query_params.get("amenity").cloned())
	} else {
		let parsed = RequestBody::from_parts(content_type, body.to_vec());
		let query = parsed.field("data").or_else(|| parsed.as_text());
		let amenity = parsed.field("amenity").or_else(|| query_params.get("amenity").cloned());
		(query, amenity)
	};

	let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()).map(str::to_string);

	match state.dispatcher.dispatch(query.as_deref(), amenity_param.as_deref(), if_none_match.as_deref()).await {
		Ok(DispatchOutcome::PassThrough) => proxy::forward(State(state), method, uri, headers, body).await,
		Ok(DispatchOutcome::NotModified { etag }) => {
			let mut response = StatusCode::NOT_MODIFIED.into_response();
			if let Ok(value) = header::HeaderValue::from_str(&etag) {
				response.headers_mut().insert(header::ETAG, value);
			}
			response
		}
		Ok(DispatchOutcome::Served { etag, cache_status, body }) => {
			let mut response = Json(body).into_response();
			if let Ok(value) = header::HeaderValue::from_str(&etag) {
				response.headers_mut().insert(header::ETAG, value);
			}
			if let Ok(value) = header::HeaderValue::from_str(cache_status_header(cache_status)) {
				response.headers_mut().insert("x-cache", value);
			}
			response
		}
		Err(err) => cacheable_error_response(&err),
	}
}

fn cache_status_header(status: CacheStatus) -> &'static str {
	status.as_str()
}

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
	match query {
		Some(q) => url::form_urlencoded::parse(q.as_bytes()).into_owned().collect(),
		None => HashMap::new(),
	}
}
