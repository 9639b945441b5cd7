//! Environment-driven configuration (§6.2). Grounded on
//! `versatiles::config::main::Config`'s shape (struct + constructor +
//! shallow per-field defaults) but reads `std::env::var` instead of YAML,
//! since the deployable unit here is a container image configured by its
//! environment, not a CLI tool pointed at a config file.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_UPSTREAM_URL: &str = "https://overpass-api.de/api/interpreter";

#[derive(Debug, Clone)]
pub struct Config {
	pub server_ip: String,
	pub port: u16,
	pub upstream_urls: Vec<String>,
	pub redis_url: String,
	pub cache_ttl: Duration,
	pub swr_window: Duration,
	pub tile_precision: usize,
	pub upstream_tile_precision: usize,
	pub max_tiles_per_request: usize,
	pub upstream_failure_cooldown: Duration,
	pub upstream_daily_limit: i64,
	pub transparent_only: bool,
	pub miss_lock_ttl: Duration,
	pub max_concurrent_refreshes: usize,
	pub cors_allowed_origins: Vec<String>,
	pub request_timeout: Duration,
	pub http_client_user_agent: String,
	pub log_level: log::LevelFilter,
}

impl Config {
	pub fn from_env() -> Result<Self> {
		let env = |key: &str| std::env::var(key).ok();
		Self::from_values(&env)
	}

	/// Built against a lookup closure rather than `std::env::var` directly so
	/// the resolution logic (defaults, derived values) is unit-testable
	/// without mutating real process environment. Also used by this crate's
	/// own integration tests to point a `Config` at an ephemeral port and a
	/// test redis instance.
	pub fn from_values(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
		let port = parse_or_default(lookup("PORT"), 8080u16, "PORT")?;
		let server_ip = lookup("SERVER_IP").unwrap_or_else(|| "0.0.0.0".to_string());
		let upstream_urls = resolve_upstream_urls(lookup("UPSTREAM_URL").as_deref(), lookup("UPSTREAM_URLS").as_deref());
		let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://redis:6379".to_string());

		let cache_ttl_seconds = parse_or_default(lookup("CACHE_TTL_SECONDS"), 86_400u64, "CACHE_TTL_SECONDS")?;
		let swr_seconds = resolve_swr_seconds(lookup("SWR_SECONDS").as_deref(), cache_ttl_seconds)?;

		let tile_precision = parse_or_default(lookup("TILE_PRECISION"), 5usize, "TILE_PRECISION")?;
		let upstream_tile_precision =
			resolve_upstream_tile_precision(lookup("UPSTREAM_TILE_PRECISION").as_deref(), tile_precision)?;

		let max_tiles_per_request = parse_or_default(lookup("MAX_TILES_PER_REQUEST"), 1024usize, "MAX_TILES_PER_REQUEST")?;
		let upstream_failure_cooldown_seconds =
			parse_or_default(lookup("UPSTREAM_FAILURE_COOLDOWN_SECONDS"), 60u64, "UPSTREAM_FAILURE_COOLDOWN_SECONDS")?;
		let upstream_daily_limit = parse_or_default(lookup("UPSTREAM_DAILY_LIMIT"), -1i64, "UPSTREAM_DAILY_LIMIT")?;
		let transparent_only = parse_or_default(lookup("TRANSPARENT_ONLY"), false, "TRANSPARENT_ONLY")?;
		let miss_lock_ttl_seconds = parse_or_default(lookup("MISS_LOCK_TTL_SECONDS"), 10u64, "MISS_LOCK_TTL_SECONDS")?;
		let max_concurrent_refreshes = parse_or_default(lookup("MAX_CONCURRENT_REFRESHES"), 8usize, "MAX_CONCURRENT_REFRESHES")?;
		let cors_allowed_origins = resolve_cors_origins(lookup("CORS_ALLOWED_ORIGINS").as_deref());
		let request_timeout_seconds = parse_or_default(lookup("REQUEST_TIMEOUT_SECONDS"), 15u64, "REQUEST_TIMEOUT_SECONDS")?;
		let http_client_user_agent = lookup("HTTP_CLIENT_USER_AGENT")
			.unwrap_or_else(|| format!("overpass-tilecache-rs/{}", env!("CARGO_PKG_VERSION")));
		let log_level = resolve_log_level(lookup("LOG_VERBOSITY").as_deref(), lookup("LOG_LEVEL").as_deref(), cfg!(test));

		Ok(Config {
			server_ip,
			port,
			upstream_urls,
			redis_url,
			cache_ttl: Duration::from_secs(cache_ttl_seconds),
			swr_window: Duration::from_secs(swr_seconds),
			tile_precision,
			upstream_tile_precision,
			max_tiles_per_request,
			upstream_failure_cooldown: Duration::from_secs(upstream_failure_cooldown_seconds),
			upstream_daily_limit,
			transparent_only,
			miss_lock_ttl: Duration::from_secs(miss_lock_ttl_seconds),
			max_concurrent_refreshes,
			cors_allowed_origins,
			request_timeout: Duration::from_secs(request_timeout_seconds),
			http_client_user_agent,
			log_level,
		})
	}
}

fn parse_or_default<T: FromStr>(raw: Option<String>, default: T, key: &str) -> Result<T>
where
	T::Err: std::fmt::Display,
{
	match raw {
		Some(v) => v.trim().parse::<T>().map_err(|e| anyhow::anyhow!("invalid {key}={v:?}: {e}")),
		None => Ok(default),
	}
}

fn resolve_upstream_urls(single: Option<&str>, pool: Option<&str>) -> Vec<String> {
	if let Some(raw) = pool {
		let urls: Vec<String> = raw.split(|c: char| c == ',' || c.is_whitespace()).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
		if !urls.is_empty() {
			return urls;
		}
	}
	if let Some(raw) = single {
		let trimmed = raw.trim();
		if !trimmed.is_empty() {
			return vec![trimmed.to_string()];
		}
	}
	vec![DEFAULT_UPSTREAM_URL.to_string()]
}

fn resolve_cors_origins(raw: Option<&str>) -> Vec<String> {
	match raw {
		Some(v) => {
			let origins: Vec<String> = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
			if origins.is_empty() { vec!["*".to_string()] } else { origins }
		}
		None => vec!["*".to_string()],
	}
}

fn resolve_swr_seconds(raw: Option<&str>, cache_ttl_seconds: u64) -> Result<u64> {
	match raw {
		Some(v) => v.trim().parse::<u64>().context("parsing SWR_SECONDS"),
		None => Ok((cache_ttl_seconds / 10).max(30)),
	}
}

fn resolve_upstream_tile_precision(raw: Option<&str>, tile_precision: usize) -> Result<usize> {
	match raw {
		Some(v) => v.trim().parse::<usize>().context("parsing UPSTREAM_TILE_PRECISION"),
		None => Ok(tile_precision.saturating_sub(2).max(2)),
	}
}

/// `LOG_VERBOSITY` (errors|info|full) takes precedence over `LOG_LEVEL`
/// (a plain `log::LevelFilter` name); with neither set, tests are silent
/// and the running server defaults to `info`.
fn resolve_log_level(verbosity: Option<&str>, level: Option<&str>, is_test: bool) -> log::LevelFilter {
	if let Some(v) = verbosity {
		match v.to_lowercase().as_str() {
			"errors" => return log::LevelFilter::Error,
			"info" => return log::LevelFilter::Info,
			"full" | "debug" | "verbose" => return log::LevelFilter::Debug,
			_ => {}
		}
	}
	if let Some(v) = level {
		if let Ok(parsed) = v.parse::<log::LevelFilter>() {
			return parsed;
		}
	}
	if is_test { log::LevelFilter::Off } else { log::LevelFilter::Info }
}
