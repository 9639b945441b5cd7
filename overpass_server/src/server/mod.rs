//! The axum HTTP surface: routing, handlers, CORS, and server lifecycle.
//! Grounded on `versatiles::server`'s module split (`cors`, `handlers`,
//! `routes`, `tile_server`), trimmed to this crate's single cacheable
//! endpoint plus the pass-through surface. `tile_server` becomes
//! `lifecycle` here: there are no hot-reloadable tile/static source maps
//! to own, just one `Dispatcher`.

pub mod cors;
pub mod error_response;
mod handlers;
mod ingress;
pub mod lifecycle;
pub mod routes;

use std::sync::Arc;

use overpass_cache::{Dispatcher, UpstreamClient};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
	pub dispatcher: Arc<Dispatcher>,
	pub upstream_client: Arc<UpstreamClient>,
}
