//! Batch rate-limit checks.
//!
//! The batch shares the single-check rules but fans them out with as few round trips as
//! possible: distinct namespaces are resolved in one datastore read, missing ones are created in
//! one transaction behind a single create-permission check, and limiting is authorized once for
//! the whole batch as `ratelimit.*.limit OR (every ratelimit.<namespace>.limit)`. The limiter's
//! batch operation runs exactly once and the response carries one outcome per check, in input
//! order, whether or not each check passed.

// self
use crate::{
	_prelude::*,
	auth::{Action, Permission, PermissionQuery},
	error::ValidationError,
	flows::{
		BatchOutcome, Broker, CheckContext, PlannedCheck, RateLimitCheck, RateLimitOutcome, common,
	},
	limiter::LimiterError,
	namespace::Namespace,
	obs::FlowKind,
};

impl Broker {
	/// Evaluates every check and reports every outcome in input order.
	///
	/// Validation, authorization, creation, and soft-deleted namespaces fail the whole batch
	/// before the limiter is called.
	pub async fn limit_many(
		&self,
		ctx: &CheckContext,
		checks: Vec<RateLimitCheck>,
	) -> Result<BatchOutcome> {
		self.observe(FlowKind::LimitMany, "limit_many", async move {
			if checks.is_empty() {
				return Err(ValidationError::EmptyBatch.into());
			}

			let requested =
				checks.iter().map(RateLimitCheck::requested).collect::<Result<Vec<_>, _>>()?;
			let namespaces = self.resolve_or_create_many(ctx, &checks).await?;

			ctx.authorize(&PermissionQuery::any_or_all(
				namespaces.iter().map(|namespace| namespace.id.to_string()),
				Action::Limit,
			))
			.await?;

			let started = OffsetDateTime::now_utc();
			let mut planned = Vec::with_capacity(checks.len());

			for ((check, namespace), requested) in checks.iter().zip(&namespaces).zip(requested) {
				common::ensure_live(namespace, &check.namespace)?;
				planned.push(PlannedCheck::new(namespace, check, requested, started)?);
			}

			let requests: Vec<_> = planned.iter().map(|plan| plan.request.clone()).collect();
			let responses = self.limiter.evaluate_many(&requests).await?;

			if responses.len() != requests.len() {
				return Err(LimiterError::LengthMismatch {
					expected: requests.len(),
					actual: responses.len(),
				}
				.into());
			}

			let share = (OffsetDateTime::now_utc() - started)
				/ u32::try_from(requests.len()).unwrap_or(u32::MAX);
			let outcomes: Vec<_> = checks
				.iter()
				.zip(planned)
				.zip(responses)
				.map(|((check, plan), response)| RateLimitOutcome::new(check, plan, response))
				.collect();

			if ctx.telemetry {
				for (request, outcome) in requests.iter().zip(&outcomes) {
					self.telemetry.buffer(common::telemetry_event(ctx, request, outcome, share));
				}
			}

			self.flow_metrics.record_outcomes(&outcomes);

			Ok(BatchOutcome::new(outcomes))
		})
		.await
	}

	/// Resolves the namespace of every check, in check order, creating the missing ones.
	async fn resolve_or_create_many(
		&self,
		ctx: &CheckContext,
		checks: &[RateLimitCheck],
	) -> Result<Vec<Arc<Namespace>>> {
		let mut seen = HashSet::new();
		let names: Vec<String> = checks
			.iter()
			.filter(|check| seen.insert(check.namespace.as_str()))
			.map(|check| check.namespace.clone())
			.collect();
		let mut resolved = self.cache.resolve_many(&ctx.workspace_id, &names).await?;
		let missing: Vec<String> =
			names.into_iter().filter(|name| !resolved.contains_key(name)).collect();

		if !missing.is_empty() {
			ctx.authorize(&Permission::any(Action::CreateNamespace).into()).await?;

			let created = self.creator.create_many(&ctx.workspace_id, &missing, &ctx.key_id).await?;

			resolved.extend(created);
		}

		checks
			.iter()
			.map(|check| {
				resolved
					.get(&check.namespace)
					.cloned()
					.ok_or_else(|| Error::namespace_not_found(check.namespace.as_str()))
			})
			.collect()
	}
}
