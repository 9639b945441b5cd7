//! Per-URL cooldown and daily quota tracking (§4.5).
//!
//! Pool state is process-local (§5 "Shared-resource policy" — operators
//! running multiple replicas accept independently-tracked cooldown/quota).
//! Counter mutation is short and non-blocking, so a plain `std::sync::Mutex`
//! guards it rather than an async one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use rand::seq::SliceRandom;

use crate::error::DispatchError;

#[derive(Debug, Clone, Default)]
struct UpstreamState {
	failed_until: Option<DateTime<Utc>>,
	blocked_until: Option<DateTime<Utc>>,
	requests_today: i64,
	day_start: Option<DateTime<Utc>>,
}

/// `{acquired | cooldown | limit | blocked}` (§4.5 `tryAcquire`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
	Acquired,
	Cooldown,
	Blocked,
}

pub struct UpstreamPool {
	urls: Vec<String>,
	cooldown: StdDuration,
	daily_limit: i64,
	state: Mutex<HashMap<String, UpstreamState>>,
}

/// The UTC instant of local midnight for the local calendar day containing
/// `now` (§4.5 `tryAcquire`'s `startOfLocalDay`; §8 "Quota" is a local-day
/// window, not a UTC one).
fn start_of_local_day(now: DateTime<Utc>) -> DateTime<Utc> {
	let local_now = now.with_timezone(&Local);
	let local_midnight = local_now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is always valid");
	Local.from_local_datetime(&local_midnight).earliest().unwrap_or(local_now).with_timezone(&Utc)
}

impl UpstreamPool {
	/// `dailyLimit < 0` disables quota enforcement.
	pub fn new(urls: Vec<String>, cooldown: StdDuration, daily_limit: i64) -> Self {
		let state = urls.iter().map(|u| (u.clone(), UpstreamState::default())).collect();
		UpstreamPool { urls, cooldown, daily_limit, state: Mutex::new(state) }
	}

	/// Among URLs not in `excluded` and currently eligible, pick one
	/// uniformly at random.
	pub fn next(&self, excluded: &[String]) -> Option<String> {
		let now = Utc::now();
		let state = self.state.lock().expect("upstream pool mutex poisoned");
		let mut candidates: Vec<&String> = self
			.urls
			.iter()
			.filter(|url| !excluded.contains(url))
			.filter(|url| {
				let s = state.get(*url).cloned().unwrap_or_default();
				let not_in_cooldown = s.failed_until.is_none_or(|t| t <= now);
				let not_blocked = s.blocked_until.is_none_or(|t| t <= now);
				let under_limit = self.daily_limit < 0 || s.requests_today < self.daily_limit;
				not_in_cooldown && not_blocked && under_limit
			})
			.collect();
		candidates.shuffle(&mut rand::thread_rng());
		candidates.first().map(|s| (*s).clone())
	}

	/// Day-rollover check, cooldown/limit enforcement, and quota increment.
	pub fn try_acquire(&self, url: &str) -> AcquireOutcome {
		let now = Utc::now();
		let mut state = self.state.lock().expect("upstream pool mutex poisoned");
		let entry = state.entry(url.to_string()).or_default();

		if entry.day_start.is_none_or(|d| d < start_of_local_day(now)) {
			entry.requests_today = 0;
			entry.day_start = Some(start_of_local_day(now));
			entry.blocked_until = None;
		}

		if entry.failed_until.is_some_and(|t| t > now) {
			return AcquireOutcome::Cooldown;
		}
		if entry.blocked_until.is_some_and(|t| t > now) {
			return AcquireOutcome::Blocked;
		}
		if self.daily_limit >= 0 && entry.requests_today >= self.daily_limit {
			entry.blocked_until = Some(now + Duration::hours(24));
			return AcquireOutcome::Blocked;
		}

		entry.requests_today += 1;
		if self.daily_limit >= 0 && entry.requests_today >= self.daily_limit {
			entry.blocked_until = Some(now + Duration::hours(24));
		}
		AcquireOutcome::Acquired
	}

	pub fn mark_failure(&self, url: &str) {
		if self.cooldown.is_zero() {
			return;
		}
		let mut state = self.state.lock().expect("upstream pool mutex poisoned");
		let entry = state.entry(url.to_string()).or_default();
		entry.failed_until = Some(Utc::now() + Duration::from_std(self.cooldown).unwrap_or(Duration::zero()));
	}

	pub fn mark_success(&self, url: &str) {
		let mut state = self.state.lock().expect("upstream pool mutex poisoned");
		if let Some(entry) = state.get_mut(url) {
			entry.failed_until = None;
		}
	}

	/// True if every URL is quota-blocked right now.
	pub fn is_exhausted_by_limit(&self) -> bool {
		if self.daily_limit < 0 {
			return false;
		}
		let now = Utc::now();
		let state = self.state.lock().expect("upstream pool mutex poisoned");
		self.urls.iter().all(|url| state.get(url).is_some_and(|s| s.blocked_until.is_some_and(|t| t > now)))
	}

	/// Drives `next`/`try_acquire`/`f`/`mark_*` in a loop per §4.5's
	/// `withUpstream`. `f` classifies its own failures via the returned
	/// `UpstreamAttemptError` so this loop knows whether to fail over.
	pub async fn with_upstream<F, Fut, T>(&self, mut f: F) -> Result<T, DispatchError>
	where
		F: FnMut(String) -> Fut,
		Fut: std::future::Future<Output = Result<T, UpstreamAttemptError>>,
	{
		let mut excluded = Vec::new();
		let mut last_error: Option<String> = None;

		loop {
			let Some(url) = self.next(&excluded) else {
				let reason = last_error.unwrap_or_else(|| {
					if self.is_exhausted_by_limit() {
						"daily limit reached on all upstreams".to_string()
					} else {
						"no upstream available".to_string()
					}
				});
				return Err(DispatchError::UpstreamUnavailable(reason));
			};

			match self.try_acquire(&url) {
				AcquireOutcome::Acquired => {}
				AcquireOutcome::Cooldown | AcquireOutcome::Blocked => {
					excluded.push(url);
					continue;
				}
			}

			match f(url.clone()).await {
				Ok(value) => {
					self.mark_success(&url);
					return Ok(value);
				}
				Err(UpstreamAttemptError::ClientError(msg)) => {
					// 4xx (non-429): propagate immediately, no failover (§4.5).
					return Err(anyhow!(msg).into());
				}
				Err(UpstreamAttemptError::Transient(msg)) => {
					self.mark_failure(&url);
					excluded.push(url);
					last_error = Some(msg);
				}
			}
		}
	}
}

/// How `UpstreamClient` classifies a single attempt's failure, so
/// `UpstreamPool::with_upstream` knows whether to fail over (§4.5, §4.6).
#[derive(Debug, Clone)]
pub enum UpstreamAttemptError {
	/// 4xx (non-429): semantically rejected, not a broken upstream.
	ClientError(String),
	/// Network error, 5xx, 429, timeout, or parse failure: triggers failover.
	Transient(String),
}
