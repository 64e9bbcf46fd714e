//! Single rate-limit check.
//!
//! [`Broker::limit`] resolves the namespace (auto-creating it on a miss when the caller holds
//! `ratelimit.*.create_namespace`), rejects soft-deleted namespaces, authorizes
//! `ratelimit.<namespace>.limit OR ratelimit.*.limit`, applies the matching override, and calls
//! the limiter exactly once.

// self
use crate::{
	_prelude::*,
	auth::{Action, PermissionQuery},
	flows::{Broker, CheckContext, PlannedCheck, RateLimitCheck, RateLimitOutcome, common},
	obs::FlowKind,
};

impl Broker {
	/// Evaluates one check and reports its outcome, including a rejection by the limiter.
	pub async fn limit(
		&self,
		ctx: &CheckContext,
		check: RateLimitCheck,
	) -> Result<RateLimitOutcome> {
		self.observe(FlowKind::Limit, "limit", async move {
			let requested = check.requested()?;
			let namespace = self.resolve_or_create(ctx, &check.namespace).await?;

			common::ensure_live(&namespace, &check.namespace)?;
			ctx.authorize(&PermissionQuery::specific_or_any(namespace.id.as_ref(), Action::Limit))
				.await?;

			let started = OffsetDateTime::now_utc();
			let planned = PlannedCheck::new(&namespace, &check, requested, started)?;
			let response = self.limiter.evaluate(&planned.request).await?;
			let latency = OffsetDateTime::now_utc() - started;
			let request = planned.request.clone();
			let outcome = RateLimitOutcome::new(&check, planned, response);

			if ctx.telemetry {
				self.telemetry.buffer(common::telemetry_event(ctx, &request, &outcome, latency));
			}

			self.flow_metrics.record_outcomes([&outcome]);

			Ok(outcome)
		})
		.await
	}
}
