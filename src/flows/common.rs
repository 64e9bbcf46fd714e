//! Shared request and response types for flow implementations (contexts, checks, outcomes,
//! validation, override application, counters).

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Authorizer, KeyId, NamespaceId, OverrideId, PermissionQuery, WorkspaceId, id},
	error::ValidationError,
	limiter::{LimitRequest, LimitResponse},
	namespace::{self, Namespace},
	telemetry::RatelimitEvent,
};

/// Maximum byte length of a limited identifier or override pattern.
pub const IDENTIFIER_MAX_LEN: usize = 255;

const DEFAULT_COST: i64 = 1;

/// Per-request caller state: who is asking, how to authorize them, and whether to record
/// telemetry.
#[derive(Clone)]
pub struct CheckContext {
	/// Workspace the caller authenticated into.
	pub workspace_id: WorkspaceId,
	/// Root key the caller authenticated with; recorded as the audit actor.
	pub key_id: KeyId,
	/// Evaluator for the permission queries built by the flows.
	pub authorizer: Arc<dyn Authorizer>,
	/// Buffers one telemetry event per evaluated check when true.
	pub telemetry: bool,
	/// Correlation identifier copied into telemetry events.
	pub request_id: String,
}
impl CheckContext {
	/// Creates a context with a generated request ID and telemetry disabled.
	pub fn new(workspace_id: WorkspaceId, key_id: KeyId, authorizer: Arc<dyn Authorizer>) -> Self {
		Self {
			workspace_id,
			key_id,
			authorizer,
			telemetry: false,
			request_id: id::random_id("req_"),
		}
	}

	/// Enables or disables telemetry buffering.
	pub fn with_telemetry(mut self, enabled: bool) -> Self {
		self.telemetry = enabled;

		self
	}

	/// Replaces the generated request ID.
	pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = request_id.into();

		self
	}

	pub(crate) async fn authorize(&self, query: &PermissionQuery) -> Result<()> {
		self.authorizer.verify(query).await
	}
}
impl Debug for CheckContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CheckContext")
			.field("workspace_id", &self.workspace_id)
			.field("key_id", &self.key_id)
			.field("telemetry", &self.telemetry)
			.field("request_id", &self.request_id)
			.finish()
	}
}

/// One incoming rate-limit check, as declared by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCheck {
	/// Namespace name or ID.
	pub namespace: String,
	/// Caller-supplied identifier (user, IP, key, ...).
	pub identifier: String,
	/// Requests per window when no override applies.
	pub limit: i64,
	/// Window length in milliseconds when no override applies.
	pub duration_ms: i64,
	/// Units consumed; defaults to 1.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cost: Option<i64>,
}
impl RateLimitCheck {
	/// Creates a check with the default cost.
	pub fn new(
		namespace: impl Into<String>,
		identifier: impl Into<String>,
		limit: i64,
		duration_ms: i64,
	) -> Self {
		Self {
			namespace: namespace.into(),
			identifier: identifier.into(),
			limit,
			duration_ms,
			cost: None,
		}
	}

	/// Sets an explicit cost; zero only peeks at the remaining budget.
	pub fn with_cost(mut self, cost: i64) -> Self {
		self.cost = Some(cost);

		self
	}

	/// Rejects malformed checks before any resolution work starts.
	pub fn validate(&self) -> Result<(), ValidationError> {
		self.requested().map(|_| ())
	}

	pub(crate) fn requested(&self) -> Result<Requested, ValidationError> {
		namespace::validate_name(&self.namespace)?;
		validate_identifier(&self.identifier)?;

		let cost = self.cost.unwrap_or(DEFAULT_COST);

		Ok(Requested {
			limit: validate_limit(self.limit)?,
			duration_ms: validate_duration(self.duration_ms)?,
			cost: u64::try_from(cost).map_err(|_| ValidationError::NegativeCost(cost))?,
		})
	}
}

/// Verdict for one check, reported whether or not it passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOutcome {
	/// Namespace name or ID exactly as the caller sent it.
	pub namespace: String,
	/// Resolved namespace ID.
	pub namespace_id: NamespaceId,
	/// Identifier that was limited.
	pub identifier: String,
	/// Whether the request fits within the limit.
	pub passed: bool,
	/// Effective limit, after override resolution.
	pub limit: u64,
	/// Units left in the current window.
	pub remaining: u64,
	/// Instant the current window resets.
	pub reset_at: OffsetDateTime,
	/// Override that supplied the effective limit, if any.
	pub override_id: Option<OverrideId>,
}
impl RateLimitOutcome {
	pub(crate) fn new(
		check: &RateLimitCheck,
		planned: PlannedCheck,
		response: LimitResponse,
	) -> Self {
		Self {
			namespace: check.namespace.clone(),
			namespace_id: planned.request.name,
			identifier: check.identifier.clone(),
			passed: response.success,
			limit: response.limit,
			remaining: response.remaining,
			reset_at: response.reset,
			override_id: planned.override_id,
		}
	}
}

/// Complete, ordered result of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
	/// Logical AND of every outcome's `passed` flag.
	pub all_passed: bool,
	/// One outcome per input check, in input order.
	pub outcomes: Vec<RateLimitOutcome>,
}
impl BatchOutcome {
	pub(crate) fn new(outcomes: Vec<RateLimitOutcome>) -> Self {
		Self { all_passed: outcomes.iter().all(|outcome| outcome.passed), outcomes }
	}
}

/// Thread-safe counters for evaluated checks.
#[derive(Debug, Default)]
pub struct FlowMetrics {
	checks: AtomicU64,
	passed: AtomicU64,
	failures: AtomicU64,
}
impl FlowMetrics {
	/// Returns the number of checks handed to the limiter.
	pub fn checks(&self) -> u64 {
		self.checks.load(Ordering::Relaxed)
	}

	/// Returns the number of checks that passed.
	pub fn passed(&self) -> u64 {
		self.passed.load(Ordering::Relaxed)
	}

	/// Returns the number of checks rejected by the limiter.
	pub fn rejected(&self) -> u64 {
		self.checks().saturating_sub(self.passed())
	}

	/// Returns the number of flow calls that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_outcomes<'a, I>(&self, outcomes: I)
	where
		I: IntoIterator<Item = &'a RateLimitOutcome>,
	{
		for outcome in outcomes {
			self.checks.fetch_add(1, Ordering::Relaxed);

			if outcome.passed {
				self.passed.fetch_add(1, Ordering::Relaxed);
			}
		}
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}

/// Validated numeric parameters of a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Requested {
	pub(crate) limit: u64,
	pub(crate) duration_ms: u64,
	pub(crate) cost: u64,
}

/// Limiter request for one check plus the override that shaped it.
#[derive(Clone, Debug)]
pub(crate) struct PlannedCheck {
	pub(crate) request: LimitRequest,
	pub(crate) override_id: Option<OverrideId>,
}
impl PlannedCheck {
	/// Applies the namespace's override for the check's identifier, falling back to the
	/// caller-declared limit and window.
	pub(crate) fn new(
		namespace: &Namespace,
		check: &RateLimitCheck,
		requested: Requested,
		time: OffsetDateTime,
	) -> Result<Self> {
		let matched = namespace.overrides.resolve(&check.identifier)?;
		let (limit, duration_ms, override_id) = match matched {
			Some(item) => (item.limit, item.duration_ms, Some(item.id.clone())),
			None => (requested.limit, requested.duration_ms, None),
		};

		Ok(Self {
			request: LimitRequest {
				name: namespace.id.clone(),
				identifier: check.identifier.clone(),
				limit,
				duration_ms,
				cost: requested.cost,
				time,
			},
			override_id,
		})
	}
}

/// Fails with [`Error::Gone`] for soft-deleted namespaces.
pub(crate) fn ensure_live(namespace: &Namespace, requested_as: &str) -> Result<()> {
	if namespace.is_deleted() {
		return Err(Error::Gone { namespace: requested_as.to_owned() });
	}

	Ok(())
}

pub(crate) fn telemetry_event(
	ctx: &CheckContext,
	request: &LimitRequest,
	outcome: &RateLimitOutcome,
	latency: Duration,
) -> RatelimitEvent {
	RatelimitEvent {
		request_id: ctx.request_id.clone(),
		workspace_id: ctx.workspace_id.clone(),
		time: request.time,
		namespace_id: outcome.namespace_id.clone(),
		identifier: outcome.identifier.clone(),
		passed: outcome.passed,
		latency,
		override_id: outcome.override_id.clone(),
		limit: outcome.limit,
		remaining: outcome.remaining,
		reset_at: outcome.reset_at,
	}
}

pub(crate) fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
	if identifier.is_empty() {
		return Err(ValidationError::EmptyIdentifier);
	}
	if identifier.len() > IDENTIFIER_MAX_LEN {
		return Err(ValidationError::IdentifierTooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

pub(crate) fn validate_limit(limit: i64) -> Result<u64, ValidationError> {
	u64::try_from(limit).map_err(|_| ValidationError::NegativeLimit(limit))
}

pub(crate) fn validate_duration(duration_ms: i64) -> Result<u64, ValidationError> {
	match u64::try_from(duration_ms) {
		Ok(value) if value > 0 => Ok(value),
		_ => Err(ValidationError::NonPositiveDuration(duration_ms)),
	}
}
