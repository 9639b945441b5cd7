//! The §4.6 pass-through forwarder: turns an axum request into a
//! `overpass_cache::ProxyRequest`, calls `UpstreamClient::proxy`, and turns
//! the result back into an axum `Response`. Grounded on
//! `versatiles_core::io::data_reader_http` for the reqwest request-building
//! style (strip `Host`, forward everything else verbatim).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use overpass_cache::{ProxyRequest, UpstreamClient};

use crate::server::error_response::pass_through_error_response;
use crate::server::AppState;

pub async fn forward(State(state): State<AppState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
	forward_with_client(&state.upstream_client, method, uri, headers, body).await
}

async fn forward_with_client(client: &Arc<UpstreamClient>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
	let path_and_query = uri.path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_else(|| uri.path().to_string());
	let request = ProxyRequest { method, path_and_query, headers, body: body.to_vec() };

	match client.proxy(request).await {
		Ok(response) => {
			let mut builder = Response::builder().status(response.status);
			for (name, value) in response.headers.iter() {
				builder = builder.header(name, value);
			}
			builder.body(axum::body::Body::from(response.body)).unwrap_or_else(|_| {
				(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to build upstream response").into_response()
			})
		}
		Err(err) => pass_through_error_response(&err),
	}
}
