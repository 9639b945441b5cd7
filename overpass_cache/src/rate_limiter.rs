//! A per-client token-bucket limiter, present but unused (§1, §2
//! "AmenityRateLimiter"). The spec lists this explicitly as an external
//! collaborator that exists in the source but that the Dispatcher never
//! calls; this module reproduces that shape faithfully — fully implemented
//! and tested, wired into nothing.

use std::time::Instant;

use dashmap::DashMap;

struct Bucket {
	tokens: f64,
	last_refill: Instant,
}

pub struct AmenityRateLimiter {
	capacity: f64,
	refill_per_second: f64,
	buckets: DashMap<String, Bucket>,
}

impl AmenityRateLimiter {
	pub fn new(capacity: f64, refill_per_second: f64) -> Self {
		AmenityRateLimiter { capacity, refill_per_second, buckets: DashMap::new() }
	}

	/// Attempts to consume one token for `client_key`. Never called by
	/// `Dispatcher`.
	pub fn try_acquire(&self, client_key: &str) -> bool {
		let now = Instant::now();
		let mut bucket = self.buckets.entry(client_key.to_string()).or_insert_with(|| Bucket {
			tokens: self.capacity,
			last_refill: now,
		});

		let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
		bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
		bucket.last_refill = now;

		if bucket.tokens >= 1.0 {
			bucket.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}
