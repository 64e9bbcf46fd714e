#![cfg(feature = "test")]

// self
use ratelimit_broker::{
	_preludet::*,
	audit::AuditEvent,
	error::{ErrorKind, ValidationError},
	flows::{CheckContext, RateLimitCheck},
	namespace::Namespace,
};

const ADMIN: [&str; 3] =
	["ratelimit.*.limit", "ratelimit.*.set_override", "ratelimit.*.delete_override"];

fn setup() -> (TestHarness, Namespace, CheckContext) {
	let harness = build_test_broker();
	let namespace = Namespace::new(workspace("ws_ovr"), "api", OffsetDateTime::now_utc());

	harness.store.seed(namespace.clone());

	let ctx = context_with_grants(&workspace("ws_ovr"), ADMIN);

	(harness, namespace, ctx)
}

#[tokio::test]
async fn set_override_takes_effect_on_the_next_check() {
	let (harness, _, ctx) = setup();
	let check = RateLimitCheck::new("api", "user_789", 100, 60_000);
	let before = harness.broker.limit(&ctx, check.clone()).await.expect("Limit should succeed.");
	let stored = harness
		.broker
		.set_override(&ctx, "api", "user_789", 200, 120_000)
		.await
		.expect("Set override should succeed.");
	let after = harness.broker.limit(&ctx, check).await.expect("Limit should succeed.");

	assert_eq!(before.limit, 100);
	assert_eq!(after.limit, 200, "The cached namespace must be invalidated, not served stale.");
	assert_eq!(after.override_id, Some(stored.id));
}

#[tokio::test]
async fn setting_twice_updates_in_place() {
	let (harness, namespace, ctx) = setup();
	let first = harness
		.broker
		.set_override(&ctx, namespace.id.as_ref(), "p*", 200, 60_000)
		.await
		.expect("First set should succeed.");
	let second = harness
		.broker
		.set_override(&ctx, "api", "p*", 300, 30_000)
		.await
		.expect("Second set should succeed.");
	let events: Vec<_> = harness.store.audit_logs().into_iter().map(|entry| entry.event).collect();

	assert_eq!(first.id, second.id);
	assert_eq!(second.limit, 300);
	assert_eq!(second.duration_ms, 30_000);
	assert_eq!(events, [AuditEvent::OverrideSet, AuditEvent::OverrideSet]);
}

#[tokio::test]
async fn delete_override_restores_the_requested_limit() {
	let (harness, _, ctx) = setup();

	harness
		.broker
		.set_override(&ctx, "api", "user_1", 5, 60_000)
		.await
		.expect("Set override should succeed.");

	let removed = harness
		.broker
		.delete_override(&ctx, "api", "user_1")
		.await
		.expect("Delete override should succeed.");
	let outcome = harness
		.broker
		.limit(&ctx, RateLimitCheck::new("api", "user_1", 50, 60_000))
		.await
		.expect("Limit should succeed.");
	let logs = harness.store.audit_logs();

	assert_eq!(removed.identifier, "user_1");
	assert_eq!(outcome.limit, 50);
	assert!(outcome.override_id.is_none());
	assert_eq!(logs.last().map(|entry| entry.event), Some(AuditEvent::OverrideDelete));
}

#[tokio::test]
async fn deleting_an_unknown_override_is_not_found() {
	let (harness, _, ctx) = setup();
	let err = harness
		.broker
		.delete_override(&ctx, "api", "nobody")
		.await
		.expect_err("Unknown overrides cannot be deleted.");

	assert_eq!(err.kind(), ErrorKind::NotFound);
	assert!(harness.store.audit_logs().is_empty());
	assert_eq!(harness.store.commits(), 0);
}

#[tokio::test]
async fn override_changes_require_their_permission() {
	let (harness, namespace, _) = setup();
	let limit_only = context_with_grants(&workspace("ws_ovr"), ["ratelimit.*.limit"]);
	let err = harness
		.broker
		.set_override(&limit_only, "api", "user_1", 5, 60_000)
		.await
		.expect_err("Setting overrides must require the set permission.");

	assert_eq!(err.kind(), ErrorKind::Unauthorized);

	let specific = context_with_grants(
		&workspace("ws_ovr"),
		[format!("ratelimit.{}.set_override", namespace.id)],
	);

	harness
		.broker
		.set_override(&specific, "api", "user_1", 5, 60_000)
		.await
		.expect("A namespace-specific grant should suffice.");

	let err = harness
		.broker
		.delete_override(&specific, "api", "user_1")
		.await
		.expect_err("Deleting overrides must require the delete permission.");

	assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn override_targets_must_exist_and_be_valid() {
	let (harness, _, ctx) = setup();
	let missing = harness
		.broker
		.set_override(&ctx, "ghost", "user_1", 5, 60_000)
		.await
		.expect_err("Overrides are never set on unknown namespaces.");

	assert_eq!(missing.kind(), ErrorKind::NotFound);
	assert_eq!(harness.store.namespace_count(), 1, "Setting overrides never auto-creates.");

	let invalid = harness
		.broker
		.set_override(&ctx, "api", "user_1", 5, 0)
		.await
		.expect_err("Zero-length windows are invalid.");

	assert!(matches!(invalid, Error::Validation(ValidationError::NonPositiveDuration(0))));
}
