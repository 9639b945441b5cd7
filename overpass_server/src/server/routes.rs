//! Router composition (§6.1). Grounded on
//! `versatiles::server::routes`'s shape: a tiny, declarative module that
//! wires handlers into a `Router` without mixing in lifecycle or CORS
//! concerns.

use axum::routing::{get, post};
use axum::Router;

use super::{handlers, AppState};
use crate::proxy;

/// `/api/interpreter` is the only cacheable route; every other `/api/*`
/// path (status, timestamp, kill_my_queries, and anything unlisted) is a
/// pass-through (§6.1).
pub fn build_router(state: AppState) -> Router {
	let api = Router::new()
		.route("/interpreter", get(handlers::interpreter).post(handlers::interpreter))
		.route("/status", get(proxy::forward))
		.route("/timestamp", get(proxy::forward))
		.route("/timestamp/{*rest}", get(proxy::forward))
		.route("/kill_my_queries", post(proxy::forward))
		.fallback(proxy::forward);

	Router::new().nest("/api", api).with_state(state)
}
