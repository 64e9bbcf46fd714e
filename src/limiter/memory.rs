//! Fixed-window in-process [`Limiter`] for tests and single-node demos.
//!
//! Windows that have ended are swept whenever a new bucket would grow the table past its sweep
//! threshold; the threshold doubles with the live bucket count so sweeping stays amortized.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::NamespaceId,
	limiter::{LimitRequest, LimitResponse, Limiter, LimiterFuture},
};

const SWEEP_FLOOR: usize = 64;

type WindowKey = (NamespaceId, String, u64);

#[derive(Clone, Copy, Debug)]
struct Window {
	start_ms: i128,
	used: u64,
}

#[derive(Debug)]
struct Windows {
	buckets: HashMap<WindowKey, Window>,
	sweep_at: usize,
}
impl Windows {
	fn sweep(&mut self, now_ms: i128) {
		self.buckets.retain(|(_, _, duration_ms), window| {
			window.start_ms + i128::from((*duration_ms).max(1)) > now_ms
		});
		self.sweep_at = (self.buckets.len() * 2).max(SWEEP_FLOOR);
	}
}
impl Default for Windows {
	fn default() -> Self {
		Self { buckets: HashMap::new(), sweep_at: SWEEP_FLOOR }
	}
}

/// Counts usage per `(namespace, identifier, window length)` in aligned fixed windows.
#[derive(Debug, Default)]
pub struct MemoryLimiter {
	windows: Mutex<Windows>,
	calls: AtomicU64,
}
impl MemoryLimiter {
	/// Number of `evaluate` plus `evaluate_many` invocations so far.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of buckets currently tracked, including ended windows not yet swept.
	pub fn buckets(&self) -> usize {
		self.windows.lock().buckets.len()
	}

	fn evaluate_locked(windows: &mut Windows, request: &LimitRequest) -> LimitResponse {
		let duration_ms = i128::from(request.duration_ms.max(1));
		let now_ms = request.time.unix_timestamp_nanos() / 1_000_000;
		let start_ms = now_ms - now_ms.rem_euclid(duration_ms);
		let key = (request.name.clone(), request.identifier.clone(), request.duration_ms);

		if !windows.buckets.contains_key(&key) && windows.buckets.len() >= windows.sweep_at {
			windows.sweep(now_ms);
		}

		let window = windows.buckets.entry(key).or_insert(Window { start_ms, used: 0 });

		if window.start_ms != start_ms {
			*window = Window { start_ms, used: 0 };
		}

		let success = window.used.saturating_add(request.cost) <= request.limit;

		if success {
			window.used += request.cost;
		}

		let until_reset = i64::try_from(start_ms + duration_ms - now_ms).unwrap_or(i64::MAX);
		let reset = request
			.time
			.checked_add(Duration::milliseconds(until_reset))
			.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());

		LimitResponse {
			success,
			limit: request.limit,
			remaining: request.limit.saturating_sub(window.used),
			reset,
		}
	}
}
impl Limiter for MemoryLimiter {
	fn evaluate<'a>(&'a self, request: &'a LimitRequest) -> LimiterFuture<'a, LimitResponse> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(Self::evaluate_locked(&mut self.windows.lock(), request))
		})
	}

	fn evaluate_many<'a>(
		&'a self,
		requests: &'a [LimitRequest],
	) -> LimiterFuture<'a, Vec<LimitResponse>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let mut windows = self.windows.lock();
			let responses = requests
				.iter()
				.map(|request| Self::evaluate_locked(&mut windows, request))
				.collect();

			Ok(responses)
		})
	}
}
