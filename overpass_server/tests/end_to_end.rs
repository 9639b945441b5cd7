//! End-to-end HTTP scenarios against a real `CacheServer`, grounded on
//! `versatiles/tests/serve.rs`'s in-process-binary pattern. These hit a
//! real redis (`REDIS_URL`, default `redis://127.0.0.1:6379`) and the real
//! `overpass-api.de` upstream, the same way the teacher's own
//! `serve_remote_url` test hits a real tile download host, so they are
//! `#[ignore]`d rather than run by default.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use overpass_cache::{Dispatcher, DispatcherConfig, TileStore, UpstreamClient, UpstreamPool};
use overpass_server::config::Config;
use overpass_server::server::lifecycle::CacheServer;
use overpass_server::server::AppState;

const QUERY_DRINKING_WATER: &str = "[bbox:52.50,13.30,52.51,13.31][amenity=drinking_water];out:json;";

struct Harness {
	host: String,
	server: CacheServer,
}

impl Harness {
	async fn start() -> Self {
		let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
		let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

		let mut lookup = std::collections::HashMap::new();
		lookup.insert("PORT".to_string(), port.to_string());
		lookup.insert("REDIS_URL".to_string(), redis_url);
		lookup.insert("CACHE_TTL_SECONDS".to_string(), "2".to_string());
		lookup.insert("SWR_SECONDS".to_string(), "2".to_string());
		lookup.insert("MAX_TILES_PER_REQUEST".to_string(), "4".to_string());
		let config = Config::from_values(&move |k| lookup.get(k).cloned()).expect("valid test config");

		let tile_store = TileStore::connect(&config.redis_url, config.cache_ttl, config.swr_window, config.miss_lock_ttl).await.expect("redis reachable");
		let pool = Arc::new(UpstreamPool::new(config.upstream_urls.clone(), config.upstream_failure_cooldown, config.upstream_daily_limit));
		let upstream_client = Arc::new(UpstreamClient::new(&config.http_client_user_agent, pool).unwrap());
		let dispatcher_config = DispatcherConfig {
			tile_precision: config.tile_precision,
			upstream_tile_precision: config.upstream_tile_precision,
			max_tiles_per_request: config.max_tiles_per_request,
			max_concurrent_refreshes: config.max_concurrent_refreshes,
			transparent_only: config.transparent_only,
		};
		let dispatcher = Arc::new(Dispatcher::new(dispatcher_config, Arc::new(tile_store), upstream_client.clone()));
		let state = AppState { dispatcher, upstream_client };

		let mut server = CacheServer::new(&config, state);
		server.start().await.expect("server starts");

		Harness { host: format!("http://127.0.0.1:{port}"), server }
	}

	async fn post_interpreter(&self, query: &str) -> reqwest::Response {
		reqwest::Client::new()
			.post(format!("{}/api/interpreter", self.host))
			.header("content-type", "application/x-www-form-urlencoded")
			.body(format!("data={}", url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()))
			.send()
			.await
			.unwrap()
	}

	async fn shutdown(mut self) {
		self.server.stop().await;
	}
}

#[tokio::test]
#[ignore = "requires a reachable redis instance and network access to overpass-api.de"]
async fn cold_request_is_a_miss_and_repeat_is_a_hit() {
	let harness = Harness::start().await;

	let first = harness.post_interpreter(QUERY_DRINKING_WATER).await;
	assert_eq!(first.status(), reqwest::StatusCode::OK);
	assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
	let etag = first.headers().get("etag").cloned();

	let second = harness.post_interpreter(QUERY_DRINKING_WATER).await;
	assert_eq!(second.status(), reqwest::StatusCode::OK);
	assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
	assert_eq!(second.headers().get("etag").cloned(), etag);

	harness.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a reachable redis instance and network access to overpass-api.de"]
async fn matching_if_none_match_yields_304_with_no_body() {
	let harness = Harness::start().await;

	let first = harness.post_interpreter(QUERY_DRINKING_WATER).await;
	let etag = first.headers().get("etag").unwrap().to_str().unwrap().to_string();

	let conditional = reqwest::Client::new()
		.post(format!("{}/api/interpreter", harness.host))
		.header("content-type", "application/x-www-form-urlencoded")
		.header("if-none-match", etag)
		.body(format!("data={}", url::form_urlencoded::byte_serialize(QUERY_DRINKING_WATER.as_bytes()).collect::<String>()))
		.send()
		.await
		.unwrap();
	assert_eq!(conditional.status(), reqwest::StatusCode::NOT_MODIFIED);
	assert!(conditional.bytes().await.unwrap().is_empty());

	harness.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a reachable redis instance and network access to overpass-api.de"]
async fn stale_after_ttl_serves_stale_and_refreshes_in_background() {
	let harness = Harness::start().await;

	harness.post_interpreter(QUERY_DRINKING_WATER).await;
	tokio::time::sleep(Duration::from_secs(3)).await;

	let stale = harness.post_interpreter(QUERY_DRINKING_WATER).await;
	assert_eq!(stale.headers().get("x-cache").unwrap(), "STALE");

	harness.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a reachable redis instance and network access to overpass-api.de"]
async fn query_without_amenity_filter_passes_through_untouched() {
	let harness = Harness::start().await;

	let resp = harness.post_interpreter("[out:json];node(52.50,13.30,52.51,13.31);out;").await;
	assert_ne!(resp.headers().get("x-cache"), Some(&reqwest::header::HeaderValue::from_static("HIT")));

	harness.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a reachable redis instance"]
async fn oversized_bbox_is_rejected_with_413() {
	let harness = Harness::start().await;

	let huge_bbox = "[bbox:-90,-180,90,180][amenity=drinking_water];out:json;";
	let resp = harness.post_interpreter(huge_bbox).await;
	assert_eq!(resp.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);

	harness.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a reachable redis instance and network access to overpass-api.de"]
async fn status_endpoint_is_forwarded_as_pass_through() {
	let harness = Harness::start().await;

	let resp = reqwest::get(format!("{}/api/status", harness.host)).await.unwrap();
	assert!(resp.status().is_success() || resp.status() == reqwest::StatusCode::BAD_GATEWAY);

	harness.shutdown().await;
}
