// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{self, CacheOutcome};

/// Thread-safe counters for namespace cache lookups.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	fresh: AtomicU64,
	stale: AtomicU64,
	negative: AtomicU64,
	misses: AtomicU64,
	loads: AtomicU64,
	evictions: AtomicU64,
}
impl CacheMetrics {
	/// Lookups served from a fresh entry.
	pub fn fresh_hits(&self) -> u64 {
		self.fresh.load(Ordering::Relaxed)
	}

	/// Lookups served from a stale entry while a refresh ran in the background.
	pub fn stale_hits(&self) -> u64 {
		self.stale.load(Ordering::Relaxed)
	}

	/// Lookups answered by a cached "does not exist" entry.
	pub fn negative_hits(&self) -> u64 {
		self.negative.load(Ordering::Relaxed)
	}

	/// Lookups that found no usable entry.
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}

	/// Store reads issued by the cache (a batch read counts once).
	pub fn loads(&self) -> u64 {
		self.loads.load(Ordering::Relaxed)
	}

	/// Entries evicted to respect the capacity bound.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	pub(crate) fn record(&self, outcome: CacheOutcome) {
		let counter = match outcome {
			CacheOutcome::Fresh => &self.fresh,
			CacheOutcome::Stale => &self.stale,
			CacheOutcome::Negative => &self.negative,
			CacheOutcome::Miss => &self.misses,
		};

		counter.fetch_add(1, Ordering::Relaxed);
		obs::record_cache_lookup(outcome);
	}

	pub(crate) fn record_load(&self) {
		self.loads.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);
	}
}
