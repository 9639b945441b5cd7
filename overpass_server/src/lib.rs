//! Wires the ambient stack (config, redis connection, upstream pool, http
//! server) around `overpass_cache::Dispatcher`. Grounded on
//! `versatiles::tools::serve::run`'s shape: resolve config, build the
//! runtime dependencies it names, construct the server, start it, wait.

pub mod config;
pub mod proxy;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use overpass_cache::{Dispatcher, DispatcherConfig, TileStore, UpstreamClient, UpstreamPool};

use config::Config;
use server::{lifecycle::CacheServer, AppState};

/// Builds every runtime dependency from `config`, starts the HTTP server,
/// and blocks until SIGINT/SIGTERM, at which point it shuts down gracefully
/// and drains any in-flight background tile refreshes before returning.
pub async fn run(config: Config) -> Result<()> {
	let tile_store = TileStore::connect(&config.redis_url, config.cache_ttl, config.swr_window, config.miss_lock_ttl)
		.await
		.context("connecting to redis")?;

	let pool = UpstreamPool::new(config.upstream_urls.clone(), config.upstream_failure_cooldown, config.upstream_daily_limit);
	let upstream_client =
		UpstreamClient::new(&config.http_client_user_agent, Arc::new(pool)).context("building upstream http client")?;

	let dispatcher_config = DispatcherConfig {
		tile_precision: config.tile_precision,
		upstream_tile_precision: config.upstream_tile_precision,
		max_tiles_per_request: config.max_tiles_per_request,
		max_concurrent_refreshes: config.max_concurrent_refreshes,
		transparent_only: config.transparent_only,
	};

	let upstream_client = Arc::new(upstream_client);
	let dispatcher = Arc::new(Dispatcher::new(dispatcher_config, Arc::new(tile_store), upstream_client.clone()));

	let state = AppState { dispatcher, upstream_client };

	let mut server = CacheServer::new(&config, state);
	server.start().await.context("starting http server")?;

	wait_for_shutdown_signal().await;

	server.stop().await;
	Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut term = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
	tokio::select! {
		_ = tokio::signal::ctrl_c() => log::info!("received ctrl-c"),
		_ = term.recv() => log::info!("received SIGTERM"),
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	log::info!("received ctrl-c");
}
