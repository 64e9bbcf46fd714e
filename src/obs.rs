//! Optional observability helpers for broker flows and the namespace cache.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `ratelimit_broker.flow` with the `flow` and
//!   `stage` (call site) fields, plus warnings for failed background cache refreshes.
//! - Enable `metrics` to increment `ratelimit_broker_flow_total` for every attempt/success/failure
//!   (labeled by `flow` + `outcome`) and `ratelimit_broker_cache_total` for every cache lookup
//!   (labeled by `outcome`).

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Broker operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Single rate-limit check.
	Limit,
	/// Batch of rate-limit checks.
	LimitMany,
	/// Namespace auto-creation.
	CreateNamespace,
	/// Override upsert.
	SetOverride,
	/// Override deletion.
	DeleteOverride,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Limit => "limit",
			FlowKind::LimitMany => "limit_many",
			FlowKind::CreateNamespace => "create_namespace",
			FlowKind::SetOverride => "set_override",
			FlowKind::DeleteOverride => "delete_override",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How a namespace cache lookup was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// Served from a fresh entry.
	Fresh,
	/// Served from a stale entry; a refresh was scheduled.
	Stale,
	/// Served from a cached "does not exist" entry.
	Negative,
	/// No usable entry; the store was consulted.
	Miss,
}
impl CacheOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Fresh => "fresh",
			CacheOutcome::Stale => "stale",
			CacheOutcome::Negative => "negative",
			CacheOutcome::Miss => "miss",
		}
	}
}
