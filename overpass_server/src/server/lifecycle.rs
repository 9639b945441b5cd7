//! HTTP server lifecycle: bind, compose middleware, serve, graceful
//! shutdown. Direct structural descendant of
//! `versatiles::server::tile_server::TileServer` (same field shape,
//! idempotent `start`/`stop`, same tower protection stack order), trimmed
//! to this crate's single `AppState` instead of hot-reloadable tile/static
//! source maps.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{BoxError, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{buffer::BufferLayer, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;

use super::{cors, routes, AppState};
use crate::config::Config;

const GLOBAL_CONCURRENCY: usize = 256;
const GLOBAL_BUFFER: usize = 512;

pub struct CacheServer {
	ip: String,
	port: u16,
	state: AppState,
	cors_allowed_origins: Vec<String>,
	request_timeout: Duration,
	exit_signal: Option<oneshot::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl CacheServer {
	pub fn new(config: &Config, state: AppState) -> Self {
		CacheServer {
			ip: config.server_ip.clone(),
			port: config.port,
			state,
			cors_allowed_origins: config.cors_allowed_origins.clone(),
			request_timeout: config.request_timeout,
			exit_signal: None,
			join: None,
		}
	}

	#[cfg(test)]
	fn new_test(ip: &str, port: u16, state: AppState) -> Self {
		CacheServer {
			ip: ip.to_string(),
			port,
			state,
			cors_allowed_origins: vec!["*".to_string()],
			request_timeout: Duration::from_secs(15),
			exit_signal: None,
			join: None,
		}
	}

	/// Idempotent: if already running, the previous instance is stopped
	/// first.
	pub async fn start(&mut self) -> Result<()> {
		if self.exit_signal.is_some() || self.join.is_some() {
			self.stop().await;
		}

		log::info!("starting server");

		let mut router: Router = routes::build_router(self.state.clone());

		let cors_layer = cors::build_cors_layer(&self.cors_allowed_origins, 3600).context("building CORS layer")?;
		router = router.layer(cors_layer).layer(axum::middleware::from_fn(cors::normalize_preflight_status));

		// Innermost to outermost: LoadShed -> ConcurrencyLimit -> Buffer ->
		// Timeout -> CatchPanic -> HandleError.
		let overload_handler = HandleErrorLayer::new(|_err: BoxError| async move {
			let mut resp = (StatusCode::SERVICE_UNAVAILABLE, "Service overloaded, try later").into_response();
			resp.headers_mut().insert("Retry-After", "2".parse().unwrap());
			Ok::<_, std::convert::Infallible>(resp)
		});

		let protection = ServiceBuilder::new()
			.layer(overload_handler)
			.layer(CatchPanicLayer::new())
			.layer(TimeoutLayer::new(self.request_timeout))
			.layer(BufferLayer::new(GLOBAL_BUFFER))
			.layer(ConcurrencyLimitLayer::new(GLOBAL_CONCURRENCY))
			.layer(LoadShedLayer::new());

		router = router.layer(protection);

		let addr = format!("{}:{}", self.ip, self.port);
		log::info!("server binding on {addr}");

		let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
		if self.port == 0 {
			self.port = listener.local_addr()?.port();
		}
		let (tx, rx) = oneshot::channel::<()>();

		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, router.into_make_service())
				.with_graceful_shutdown(async {
					rx.await.ok();
				})
				.await
			{
				log::error!("server task exited with error: {err}");
			}
		});

		self.exit_signal = Some(tx);
		self.join = Some(handle);

		Ok(())
	}

	/// Signals graceful shutdown, waits (bounded) for in-flight requests to
	/// finish, then drains any background tile refreshes the dispatcher has
	/// outstanding so a restart doesn't race a still-running refresh.
	pub async fn stop(&mut self) {
		if self.exit_signal.is_none() && self.join.is_none() {
			return;
		}

		log::info!("stopping server");

		if let Some(tx) = self.exit_signal.take() {
			let _ = tx.send(());
		}

		if let Some(handle) = self.join.take() {
			match tokio::time::timeout(Duration::from_secs(10), handle).await {
				Ok(join_result) => {
					if let Err(join_err) = join_result {
						log::warn!("server task join error: {join_err}");
					}
				}
				Err(_) => log::warn!("server task did not shut down within timeout; continuing"),
			}
		}

		self.state.dispatcher.drain_background_refreshes().await;
	}

	pub fn get_port(&self) -> u16 {
		self.port
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use overpass_cache::{Dispatcher, DispatcherConfig, TileStore, UpstreamClient, UpstreamPool};
	use std::sync::Arc;

	const IP: &str = "127.0.0.1";

	/// These exercise the real bind/listen/shutdown lifecycle against a
	/// redis instance; they require `REDIS_URL` (defaulting to
	/// `redis://127.0.0.1:6379`) to be reachable, matching how this crate
	/// is actually deployed and tested in CI.
	async fn test_state(transparent_only: bool) -> Result<AppState> {
		let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
		let tile_store = Arc::new(TileStore::connect(&redis_url, Duration::from_secs(60), Duration::from_secs(10), Duration::from_secs(5)).await?);
		let pool = Arc::new(UpstreamPool::new(vec!["https://overpass-api.de/api/interpreter".to_string()], Duration::from_secs(60), -1));
		let upstream_client = Arc::new(UpstreamClient::new("overpass-tilecache-rs/test", pool)?);
		let config = DispatcherConfig {
			tile_precision: 5,
			upstream_tile_precision: 3,
			max_tiles_per_request: 1024,
			max_concurrent_refreshes: 8,
			transparent_only,
		};
		Ok(AppState { dispatcher: Arc::new(Dispatcher::new(config, tile_store, upstream_client.clone())), upstream_client })
	}

	#[tokio::test]
	#[ignore = "requires a reachable redis instance"]
	async fn start_then_stop_is_idempotent_and_binds_ephemeral_port() {
		let state = test_state(true).await.expect("redis reachable");
		let mut server = CacheServer::new_test(IP, 0, state);
		server.start().await.unwrap();
		assert_ne!(server.get_port(), 0);
		server.stop().await;
		server.stop().await;
	}

	#[tokio::test]
	#[ignore = "requires a reachable redis instance"]
	async fn options_preflight_returns_204_with_cors_headers() {
		let state = test_state(true).await.expect("redis reachable");
		let mut server = CacheServer::new_test(IP, 0, state);
		server.start().await.unwrap();
		let port = server.get_port();

		let client = reqwest::Client::new();
		let resp = client
			.request(reqwest::Method::OPTIONS, format!("http://{IP}:{port}/api/interpreter"))
			.header("origin", "https://example.test")
			.header("access-control-request-method", "POST")
			.send()
			.await
			.unwrap();
		assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
		assert!(resp.headers().get("access-control-allow-origin").is_some());

		server.stop().await;
	}
}
