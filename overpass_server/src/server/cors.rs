//! CORS configuration. Direct structural descendant of
//! `versatiles::server::cors::build_cors_layer`: same predicate patterns
//! (`*`, `*suffix`, `prefix*`, `/regex/`, exact), trimmed to the "permissive"
//! requirement of §6.1 (every route, not just a configured subset, answers
//! `OPTIONS` with CORS headers).

use std::time::Duration;

use anyhow::Result;
use axum::http::{header::HeaderValue, request::Parts, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use regex::Regex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync + 'static>;

/// Build a `CorsLayer` with a predicate assembled from `allowed_origins`.
/// See module docs for supported pattern forms.
pub fn build_cors_layer(allowed_origins: &[String], max_age_seconds: u64) -> Result<CorsLayer> {
	let checks: Vec<Predicate> = allowed_origins
		.iter()
		.map(|pattern| {
			Ok::<Predicate, anyhow::Error>(if pattern == "*" {
				Box::new(|_: &str| true)
			} else if Regex::new(r"^\*[^*]+$")?.is_match(pattern) {
				let suffix = pattern[1..].to_string();
				Box::new(move |origin: &str| origin.ends_with(&suffix))
			} else if Regex::new(r"^[^*]+\*$")?.is_match(pattern) {
				let prefix = pattern[..pattern.len() - 1].to_string();
				Box::new(move |origin: &str| origin.starts_with(&prefix))
			} else if Regex::new(r"^/.+/$")?.is_match(pattern) {
				let re = Regex::new(&pattern[1..pattern.len() - 1])?;
				Box::new(move |origin: &str| re.is_match(origin))
			} else {
				let exact = pattern.clone();
				Box::new(move |origin: &str| origin == exact)
			})
		})
		.collect::<Result<Vec<_>>>()?;

	let layer = CorsLayer::new()
		.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _req: &Parts| {
			let origin_str = origin.to_str().unwrap_or("");
			checks.iter().any(|f| f(origin_str))
		}))
		.allow_methods(AllowMethods::any())
		.allow_headers(AllowHeaders::mirror_request())
		.max_age(Duration::from_secs(max_age_seconds));

	Ok(layer)
}

/// `tower_http::cors::CorsLayer` answers a preflight itself with `200 OK`.
/// §6.1 wants `204 No Content` on `OPTIONS *`; this thin middleware runs
/// outside the `CorsLayer` and only rewrites the status, leaving the CORS
/// headers the layer already set untouched.
pub async fn normalize_preflight_status(req: axum::extract::Request, next: Next) -> Response {
	let is_preflight = req.method() == Method::OPTIONS;
	let mut response = next.run(req).await;
	if is_preflight && response.status() == StatusCode::OK {
		*response.status_mut() = StatusCode::NO_CONTENT;
	}
	response
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{body::Body, http::header, http::Request, routing::get, Router};
	use tower::ServiceExt;

	async fn has_acao(layer: &CorsLayer, origin: &str) -> bool {
		let app = Router::new().route("/", get(|| async { "ok" })).layer(layer.clone());
		let req = Request::builder().uri("/").header(header::ORIGIN, origin).body(Body::empty()).unwrap();
		let resp = app.oneshot(req).await.unwrap();
		resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_some()
	}

	#[tokio::test]
	async fn exact_match() {
		let layer = build_cors_layer(&["https://maps.example.org".into()], 3600).unwrap();
		assert!(has_acao(&layer, "https://maps.example.org").await);
		assert!(!has_acao(&layer, "https://maps.example.com").await);
	}

	#[tokio::test]
	async fn star_all() {
		let layer = build_cors_layer(&["*".into()], 3600).unwrap();
		assert!(has_acao(&layer, "http://anything.local").await);
	}

	#[tokio::test]
	async fn suffix_match() {
		let layer = build_cors_layer(&["*example.com".into()], 3600).unwrap();
		assert!(has_acao(&layer, "https://foo.example.com").await);
		assert!(!has_acao(&layer, "https://example.org").await);
	}

	#[tokio::test]
	async fn prefix_match() {
		let layer = build_cors_layer(&["https://dev-*".into()], 3600).unwrap();
		assert!(has_acao(&layer, "https://dev-01.example.com").await);
		assert!(!has_acao(&layer, "https://prod-01.example.com").await);
	}

	#[tokio::test]
	async fn regex_match() {
		let layer = build_cors_layer(&["/^https://(foo|bar)\\.example\\.com$/".into()], 3600).unwrap();
		assert!(has_acao(&layer, "https://foo.example.com").await);
		assert!(!has_acao(&layer, "https://baz.example.com").await);
	}

	#[tokio::test]
	async fn preflight_status_is_rewritten_to_204() {
		let layer = build_cors_layer(&["*".into()], 3600).unwrap();
		let app = Router::new()
			.route("/anything", get(|| async { "ok" }))
			.layer(layer)
			.layer(axum::middleware::from_fn(normalize_preflight_status));

		let req = Request::builder()
			.method("OPTIONS")
			.uri("/anything")
			.header(header::ORIGIN, "https://example.test")
			.header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
			.body(Body::empty())
			.unwrap();

		let resp = app.oneshot(req).await.unwrap();
		assert_eq!(resp.status(), StatusCode::NO_CONTENT);
	}
}
