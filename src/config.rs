//! Explicit broker configuration; nothing is read from ambient state.

// self
use crate::{_prelude::*, error::ConfigError};

/// Top-level configuration handed to [`crate::flows::Broker::new`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
	/// Namespace cache aging and capacity.
	pub cache: CacheConfig,
	/// Retry policy for namespace and override transactions.
	pub create_retry: RetryPolicy,
}
impl BrokerConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(payload);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects values that would disable the cache or the retry loop outright.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.cache.max_entries == 0 {
			return Err(ConfigError::InvalidValue {
				field: "cache.max_entries",
				reason: "must be greater than zero",
			});
		}
		if self.create_retry.max_attempts == 0 {
			return Err(ConfigError::InvalidValue {
				field: "create_retry.max_attempts",
				reason: "must be greater than zero",
			});
		}

		Ok(())
	}
}

/// Fresh/stale windows and capacity of the namespace cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
	/// Entries younger than this are served without touching the store.
	pub fresh_ms: u64,
	/// Past the fresh window, entries are served for this long while a refresh runs.
	pub stale_ms: u64,
	/// Upper bound on cached keys (each namespace occupies a name and an ID key).
	pub max_entries: usize,
}
impl CacheConfig {
	/// Fresh window as a [`Duration`].
	pub fn fresh(&self) -> Duration {
		millis(self.fresh_ms)
	}

	/// Stale window as a [`Duration`].
	pub fn stale(&self) -> Duration {
		millis(self.stale_ms)
	}

	/// How long an entry stays cached at all: the fresh and stale windows combined.
	pub fn retention(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.fresh_ms.saturating_add(self.stale_ms))
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self { fresh_ms: 60_000, stale_ms: 300_000, max_entries: 10_000 }
	}
}

/// Linear backoff retry policy for transient datastore failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Delay multiplied by the attempt number between attempts.
	pub backoff_ms: u64,
}
impl RetryPolicy {
	/// Delay to wait after the given (1-based) failed attempt.
	pub fn backoff(&self, attempt: u32) -> std::time::Duration {
		std::time::Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, backoff_ms: 25 }
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
