//! Rate-limit engine contract consumed by the broker.
//!
//! The counting algorithm lives behind [`Limiter`]; the broker only decides which namespace,
//! identifier, limit and window each request is evaluated against.

pub mod memory;

pub use memory::MemoryLimiter;

// self
use crate::{_prelude::*, auth::NamespaceId};

/// Boxed future returned by [`Limiter`] operations.
pub type LimiterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LimiterError>> + 'a + Send>>;

/// Engine that counts usage per `(namespace, identifier)` bucket.
pub trait Limiter
where
	Self: Send + Sync,
{
	/// Evaluates a single request.
	fn evaluate<'a>(&'a self, request: &'a LimitRequest) -> LimiterFuture<'a, LimitResponse>;

	/// Evaluates every request, answering with one response per request in the same order.
	fn evaluate_many<'a>(
		&'a self,
		requests: &'a [LimitRequest],
	) -> LimiterFuture<'a, Vec<LimitResponse>>;
}

/// Request handed to the engine after override resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRequest {
	/// Namespace the bucket belongs to.
	pub name: NamespaceId,
	/// Caller-supplied identifier (user, IP, key, ...).
	pub identifier: String,
	/// Effective requests per window.
	pub limit: u64,
	/// Effective window length in milliseconds.
	pub duration_ms: u64,
	/// Units consumed by this request; zero only peeks.
	pub cost: u64,
	/// Instant the request is evaluated at.
	pub time: OffsetDateTime,
}

/// Engine verdict for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitResponse {
	/// Whether the request fits within the limit.
	pub success: bool,
	/// Limit the request was evaluated against.
	pub limit: u64,
	/// Units left in the current window.
	pub remaining: u64,
	/// Instant the current window resets.
	pub reset: OffsetDateTime,
}

/// Failures reported by a [`Limiter`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LimiterError {
	/// The engine could not be reached or failed internally.
	#[error("Rate limiter is unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// A batch evaluation returned a different number of results than requested.
	#[error("Rate limiter returned {actual} results for {expected} requests.")]
	LengthMismatch {
		/// Number of requests sent.
		expected: usize,
		/// Number of responses received.
		actual: usize,
	},
}
