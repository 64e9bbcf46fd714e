#![cfg(feature = "test")]

// self
use ratelimit_broker::{
	_preludet::*,
	error::{ErrorKind, ValidationError},
	flows::RateLimitCheck,
	namespace::{Namespace, Override, OverrideSet},
};

const LIMIT_ANY: &str = "ratelimit.*.limit";
const CREATE_ANY: &str = "ratelimit.*.create_namespace";

fn seed(harness: &TestHarness, name: &str) -> Namespace {
	let namespace = Namespace::new(workspace("ws_batch"), name, OffsetDateTime::now_utc());

	harness.store.seed(namespace.clone());

	namespace
}

#[tokio::test]
async fn outcomes_keep_input_order_when_one_check_fails() {
	let harness = build_test_broker();

	seed(&harness, "a");
	seed(&harness, "b");
	seed(&harness, "c");

	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY]);

	harness
		.broker
		.limit(&ctx, RateLimitCheck::new("b", "user_1", 1, 60_000))
		.await
		.expect("Priming check should succeed.");

	let batch = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("a", "user_1", 5, 60_000),
				RateLimitCheck::new("b", "user_1", 1, 60_000),
				RateLimitCheck::new("c", "user_1", 5, 60_000),
			],
		)
		.await
		.expect("Batch should succeed even when a check is rejected.");

	assert!(!batch.all_passed);
	assert_eq!(batch.outcomes.len(), 3);
	assert_eq!(
		batch.outcomes.iter().map(|outcome| outcome.namespace.as_str()).collect::<Vec<_>>(),
		["a", "b", "c"]
	);
	assert_eq!(
		batch.outcomes.iter().map(|outcome| outcome.passed).collect::<Vec<_>>(),
		[true, false, true]
	);
	assert_eq!(harness.limiter.calls(), 2, "The batch must call the limiter exactly once.");
}

#[tokio::test]
async fn one_missing_grant_fails_the_whole_batch() {
	let harness = build_test_broker();
	let permitted = seed(&harness, "a");

	seed(&harness, "b");

	let ctx = context_with_grants(
		&workspace("ws_batch"),
		[format!("ratelimit.{}.limit", permitted.id)],
	);
	let err = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("a", "user_1", 5, 60_000),
				RateLimitCheck::new("b", "user_1", 5, 60_000),
			],
		)
		.await
		.expect_err("A missing specific grant must fail the batch.");

	assert_eq!(err.kind(), ErrorKind::Unauthorized);
	assert_eq!(harness.limiter.calls(), 0);
}

#[tokio::test]
async fn every_specific_grant_authorizes_the_batch() {
	let harness = build_test_broker();
	let a = seed(&harness, "a");
	let b = seed(&harness, "b");
	let ctx = context_with_grants(
		&workspace("ws_batch"),
		[format!("ratelimit.{}.limit", a.id), format!("ratelimit.{}.limit", b.id)],
	);
	let batch = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("a", "user_1", 5, 60_000),
				RateLimitCheck::new(b.id.to_string(), "user_1", 5, 60_000),
				RateLimitCheck::new("a", "user_2", 5, 60_000),
			],
		)
		.await
		.expect("Holding every specific grant should suffice.");

	assert!(batch.all_passed);
	assert_eq!(batch.outcomes[1].namespace_id, b.id);
}

#[tokio::test]
async fn repeated_missing_namespaces_are_created_once() {
	let harness = build_test_broker();
	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY, CREATE_ANY]);
	let batch = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("new", "user_1", 5, 60_000),
				RateLimitCheck::new("new", "user_2", 5, 60_000),
				RateLimitCheck::new("other", "user_1", 5, 60_000),
			],
		)
		.await
		.expect("Batch auto-create should succeed.");

	assert!(batch.all_passed);
	assert_eq!(batch.outcomes[0].namespace_id, batch.outcomes[1].namespace_id);
	assert_eq!(harness.store.namespace_count(), 2);
	assert_eq!(harness.store.audit_logs().len(), 2);
	assert_eq!(harness.store.commits(), 1);
	assert_eq!(harness.store.reads(), 1, "Distinct names must be resolved in one round trip.");
}

#[tokio::test]
async fn batch_create_requires_the_create_permission() {
	let harness = build_test_broker();

	seed(&harness, "known");

	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY]);
	let err = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("known", "user_1", 5, 60_000),
				RateLimitCheck::new("unknown", "user_1", 5, 60_000),
			],
		)
		.await
		.expect_err("Creating inside a batch must require the create permission.");

	assert_eq!(err.kind(), ErrorKind::Unauthorized);
	assert_eq!(harness.store.namespace_count(), 1);
	assert_eq!(harness.limiter.calls(), 0);
}

#[tokio::test]
async fn a_deleted_namespace_fails_the_whole_batch() {
	let harness = build_test_broker();

	seed(&harness, "live");
	seed(&harness, "dead");
	harness.store.soft_delete(&workspace("ws_batch"), "dead", OffsetDateTime::now_utc());

	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY]);
	let err = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("live", "user_1", 5, 60_000),
				RateLimitCheck::new("dead", "user_1", 5, 60_000),
			],
		)
		.await
		.expect_err("A deleted namespace must not be skipped silently.");

	assert!(matches!(err, Error::Gone { ref namespace } if namespace == "dead"));
	assert_eq!(harness.limiter.calls(), 0);
}

#[tokio::test]
async fn empty_and_malformed_batches_are_rejected() {
	let harness = build_test_broker();
	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY, CREATE_ANY]);
	let empty =
		harness.broker.limit_many(&ctx, Vec::new()).await.expect_err("Empty batches are invalid.");

	assert!(matches!(empty, Error::Validation(ValidationError::EmptyBatch)));

	let malformed = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("a", "user_1", 5, 60_000),
				RateLimitCheck::new("b", "user_1", 5, -1),
			],
		)
		.await
		.expect_err("A single malformed check invalidates the batch.");

	assert!(matches!(malformed, Error::Validation(ValidationError::NonPositiveDuration(-1))));
	assert_eq!(harness.store.reads(), 0);
	assert_eq!(harness.store.namespace_count(), 0);
}

#[tokio::test]
async fn overrides_apply_per_check_and_telemetry_covers_every_check() {
	let harness = build_test_broker();
	let item = Override::new("vip_*", 1_000, 60_000);
	let mut namespace = Namespace::new(workspace("ws_batch"), "api", OffsetDateTime::now_utc());

	namespace.overrides = OverrideSet::from_overrides([item.clone()]);
	harness.store.seed(namespace);

	let ctx = context_with_grants(&workspace("ws_batch"), [LIMIT_ANY]);
	let batch = harness
		.broker
		.limit_many(
			&ctx,
			vec![
				RateLimitCheck::new("api", "vip_42", 10, 60_000),
				RateLimitCheck::new("api", "user_42", 10, 60_000),
			],
		)
		.await
		.expect("Batch should succeed.");
	let events = harness.telemetry.events();

	assert_eq!(batch.outcomes[0].limit, 1_000);
	assert_eq!(batch.outcomes[0].override_id, Some(item.id));
	assert_eq!(batch.outcomes[1].limit, 10);
	assert!(batch.outcomes[1].override_id.is_none());
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].identifier, "vip_42");
	assert_eq!(events[1].identifier, "user_42");
	assert_eq!(events[0].latency, events[1].latency, "Batch latency is shared equally.");
	assert_eq!(events[0].request_id, events[1].request_id);
}
