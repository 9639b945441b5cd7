//! Issues Overpass queries and proxies pass-through requests (§4.6).

use std::time::Duration;

use anyhow::{Context, Result};
use http::{HeaderMap, HeaderName, Method, StatusCode};
use overpass_core::types::{AmenityKey, BoundingBox, OverpassResponse};

use crate::upstream_pool::{UpstreamAttemptError, UpstreamPool};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// A transport-agnostic request for the pass-through path (§4.6 `proxy`),
/// decoupled from any particular HTTP framework so `overpass_server` can
/// adapt an axum `Request` into this without `overpass_cache` depending on
/// axum.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
	pub method: Method,
	/// Path + query string appended to the chosen upstream base URL.
	pub path_and_query: String,
	/// All request headers except `Host` (stripped by the caller).
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}

pub struct UpstreamClient {
	http: reqwest::Client,
	pool: std::sync::Arc<UpstreamPool>,
}

/// Escapes a double-quoted Overpass string literal by doubling `"` (§6.3).
fn escape_amenity(amenity: &str) -> String {
	amenity.replace('"', "\"\"")
}

/// Renders the §6.3 query template for one fetch-group rectangle.
fn render_query(bbox: &BoundingBox, amenity: &AmenityKey) -> String {
	let (south, west, north, east) = bbox.as_tuple();
	let escaped = escape_amenity(amenity.as_str());
	format!(
		"[out:json][timeout:120];\n(\n  node[\"amenity\"=\"{escaped}\"]({south},{west},{north},{east});\n  way[\"amenity\"=\"{escaped}\"]({south},{west},{north},{east});\n  relation[\"amenity\"=\"{escaped}\"]({south},{west},{north},{east});\n);\nout body meta;\n>;\nout skel qt;\n"
	)
}

/// The scheme+host(+port) of a configured pool URL, discarding its path.
/// Pool URLs name the interpreter endpoint (e.g.
/// `https://overpass-api.de/api/interpreter`); pass-through requests target
/// sibling paths (`/api/status`, `/api/timestamp`, ...) on the same origin.
fn origin_of(base_url: &str) -> Result<String, UpstreamAttemptError> {
	let parsed = url::Url::parse(base_url).map_err(|e| UpstreamAttemptError::Transient(format!("invalid upstream url {base_url}: {e}")))?;
	let host = parsed.host_str().ok_or_else(|| UpstreamAttemptError::Transient(format!("upstream url {base_url} has no host")))?;
	let mut origin = format!("{}://{host}", parsed.scheme());
	if let Some(port) = parsed.port() {
		origin.push_str(&format!(":{port}"));
	}
	Ok(origin)
}

fn classify_status(status: reqwest::StatusCode) -> Option<UpstreamAttemptError> {
	if status.is_client_error() && status.as_u16() != 429 {
		Some(UpstreamAttemptError::ClientError(format!("upstream returned {status}")))
	} else if status.is_server_error() || status.as_u16() == 429 {
		Some(UpstreamAttemptError::Transient(format!("upstream returned {status}")))
	} else {
		None
	}
}

impl UpstreamClient {
	pub fn new(user_agent: &str, pool: std::sync::Arc<UpstreamPool>) -> Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent(user_agent)
			.timeout(UPSTREAM_TIMEOUT)
			.build()
			.context("building upstream reqwest client")?;
		Ok(UpstreamClient { http, pool })
	}

	/// Builds the amenity-scoped query for `bbox`, issues it under
	/// `UpstreamPool::with_upstream`, and parses the body as an
	/// `OverpassResponse`. A non-JSON body is treated as a transient
	/// failure (§7 `ParseError` := `UpstreamTransient`), so it participates
	/// in failover rather than surfacing directly.
	pub async fn fetch_tile(&self, bbox: &BoundingBox, amenity: &AmenityKey) -> Result<OverpassResponse, crate::error::DispatchError> {
		let query = render_query(bbox, amenity);
		let http = self.http.clone();

		self.pool
			.with_upstream(move |url| {
				let http = http.clone();
				let query = query.clone();
				async move {
					let response = http
						.post(&url)
						.form(&[("data", query.as_str())])
						.send()
						.await
						.map_err(|e| UpstreamAttemptError::Transient(e.to_string()))?;

					if let Some(err) = classify_status(response.status()) {
						return Err(err);
					}

					response
						.json::<OverpassResponse>()
						.await
						.map_err(|e| UpstreamAttemptError::Transient(format!("parse error: {e}")))
				}
			})
			.await
	}

	/// Forwards a non-cacheable request verbatim (§4.6 `proxy`). Upstream
	/// 5xx/429 trigger `markFailure` and failover; other statuses (including
	/// 4xx) pass through to the caller untouched.
	pub async fn proxy(&self, request: ProxyRequest) -> Result<ProxyResponse, crate::error::DispatchError> {
		let http = self.http.clone();
		let request = std::sync::Arc::new(request);

		self.pool
			.with_upstream(move |base_url| {
				let http = http.clone();
				let request = request.clone();
				async move {
					let origin = origin_of(&base_url)?;
					let url = format!("{origin}{}", request.path_and_query);
					let mut builder = http.request(request.method.clone(), url).body(request.body.clone());
					for (name, value) in request.headers.iter() {
						if *name != HeaderName::from_static("host") {
							builder = builder.header(name, value);
						}
					}

					let response = builder.send().await.map_err(|e| UpstreamAttemptError::Transient(e.to_string()))?;
					let status = response.status();
					let failover = status.is_server_error() || status.as_u16() == 429;

					let headers = response.headers().clone();
					let body = response.bytes().await.map_err(|e| UpstreamAttemptError::Transient(e.to_string()))?;

					if failover {
						return Err(UpstreamAttemptError::Transient(format!("upstream returned {status}")));
					}

					Ok(ProxyResponse { status, headers, body: body.to_vec() })
				}
			})
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn amenity_quotes_are_doubled() {
		assert_eq!(escape_amenity(r#"weird"amenity"#), r#"weird""amenity"#);
	}

	#[test]
	fn query_template_matches_spec_shape() {
		let bbox = BoundingBox::new(52.5, 13.3, 52.6, 13.4).unwrap();
		let amenity = AmenityKey::normalize("cafe").unwrap();
		let query = render_query(&bbox, &amenity);
		assert!(query.starts_with("[out:json][timeout:120];"));
		assert!(query.contains(r#"node["amenity"="cafe"](52.5,13.3,52.6,13.4);"#));
		assert!(query.contains("out body meta;"));
		assert!(query.ends_with("out skel qt;\n"));
	}

	#[test]
	fn origin_of_strips_path_from_interpreter_url() {
		assert_eq!(origin_of("https://overpass-api.de/api/interpreter").unwrap(), "https://overpass-api.de");
	}

	#[test]
	fn origin_of_keeps_explicit_port() {
		assert_eq!(origin_of("http://localhost:12345/api/interpreter").unwrap(), "http://localhost:12345");
	}

	#[test]
	fn classify_status_distinguishes_client_from_transient() {
		assert!(matches!(classify_status(reqwest::StatusCode::NOT_FOUND), Some(UpstreamAttemptError::ClientError(_))));
		assert!(matches!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS), Some(UpstreamAttemptError::Transient(_))));
		assert!(matches!(classify_status(reqwest::StatusCode::BAD_GATEWAY), Some(UpstreamAttemptError::Transient(_))));
		assert!(classify_status(reqwest::StatusCode::OK).is_none());
	}
}
