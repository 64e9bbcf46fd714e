//! Override management.
//!
//! Upserts and deletions run in a retried transaction together with their audit entry. The
//! cached namespace is invalidated afterwards, never patched in place, so the next check reloads
//! the namespace with its full override set.

// self
use crate::{
	_prelude::*,
	audit::{AuditEntry, AuditEvent},
	auth::{Action, PermissionQuery},
	flows::{Broker, CheckContext, common},
	namespace::{Namespace, Override},
	obs::FlowKind,
	store::{self, StoreError},
};

impl Broker {
	/// Creates or updates the override for `identifier` (exact or `*` pattern) in `namespace`.
	///
	/// Setting the same identifier twice updates the existing override and keeps its ID.
	pub async fn set_override(
		&self,
		ctx: &CheckContext,
		namespace: &str,
		identifier: &str,
		limit: i64,
		duration_ms: i64,
	) -> Result<Override> {
		self.observe(FlowKind::SetOverride, "set_override", async move {
			common::validate_identifier(identifier)?;

			let limit = common::validate_limit(limit)?;
			let duration_ms = common::validate_duration(duration_ms)?;
			let target = self.override_target(ctx, namespace, Action::SetOverride).await?;
			let target = target.as_ref();
			let actor = &ctx.key_id;
			let stored = store::run_with_retry(&self.config.create_retry, move || async move {
				let mut tx = self.store.begin().await?;
				let stored = tx.upsert_override(&target.id, identifier, limit, duration_ms).await?;
				let entry = AuditEntry::override_changed(
					AuditEvent::OverrideSet,
					target,
					&stored,
					actor,
					OffsetDateTime::now_utc(),
				);

				tx.insert_audit_logs(&[entry]).await?;
				tx.commit().await?;

				Ok::<_, StoreError>(stored)
			})
			.await?;

			self.cache.invalidate(target);

			Ok(stored)
		})
		.await
	}

	/// Deletes the override stored under exactly `identifier`, returning it.
	///
	/// Fails with [`Error::NotFound`] when no such override exists.
	pub async fn delete_override(
		&self,
		ctx: &CheckContext,
		namespace: &str,
		identifier: &str,
	) -> Result<Override> {
		self.observe(FlowKind::DeleteOverride, "delete_override", async move {
			common::validate_identifier(identifier)?;

			let target = self.override_target(ctx, namespace, Action::DeleteOverride).await?;
			let target = target.as_ref();
			let actor = &ctx.key_id;
			let removed = store::run_with_retry(&self.config.create_retry, move || async move {
				let mut tx = self.store.begin().await?;
				let Some(removed) = tx.delete_override(&target.id, identifier).await? else {
					return Ok(None);
				};
				let entry = AuditEntry::override_changed(
					AuditEvent::OverrideDelete,
					target,
					&removed,
					actor,
					OffsetDateTime::now_utc(),
				);

				tx.insert_audit_logs(&[entry]).await?;
				tx.commit().await?;

				Ok::<_, StoreError>(Some(removed))
			})
			.await?
			.ok_or_else(|| Error::NotFound { what: "Override", key: identifier.to_owned() })?;

			self.cache.invalidate(target);

			Ok(removed)
		})
		.await
	}

	/// Resolves an existing, live namespace and authorizes `action` on it.
	async fn override_target(
		&self,
		ctx: &CheckContext,
		namespace: &str,
		action: Action,
	) -> Result<Arc<Namespace>> {
		let target = self
			.cache
			.resolve(&ctx.workspace_id, namespace)
			.await?
			.ok_or_else(|| Error::namespace_not_found(namespace))?;

		common::ensure_live(&target, namespace)?;
		ctx.authorize(&PermissionQuery::specific_or_any(target.id.as_ref(), action)).await?;

		Ok(target)
	}
}
