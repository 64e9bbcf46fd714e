#![cfg(feature = "test")]

// std
use std::collections::BTreeSet;
// crates.io
use tokio::sync::Barrier;
// self
use ratelimit_broker::{
	_preludet::*,
	audit::AuditEntry,
	auth::{KeyId, NamespaceId, WorkspaceId},
	config::{BrokerConfig, RetryPolicy},
	error::ErrorKind,
	flows::{Broker, RateLimitCheck},
	limiter::MemoryLimiter,
	namespace::{Namespace, Override},
	store::{MemoryStore, NamespaceStore, NamespaceTx, StoreFuture},
	telemetry::NoopTelemetry,
};

const GRANTS: [&str; 2] = ["ratelimit.*.limit", "ratelimit.*.create_namespace"];

/// Store where another writer commits `winner` just before the first transaction commits.
struct RacingStore {
	rows: Arc<MemoryStore>,
	winner: Mutex<Option<Namespace>>,
}
impl NamespaceStore for RacingStore {
	fn find_namespace<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>> {
		self.rows.find_namespace(workspace_id, name_or_id)
	}

	fn find_namespaces<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		names_or_ids: &'a [String],
	) -> StoreFuture<'a, Vec<Namespace>> {
		self.rows.find_namespaces(workspace_id, names_or_ids)
	}

	fn begin(&self) -> StoreFuture<'_, Box<dyn NamespaceTx>> {
		Box::pin(async move {
			let tx = self.rows.begin().await?;
			let winner = self.winner.lock().take();

			Ok(Box::new(RacingTx { tx, rows: self.rows.clone(), winner }) as Box<dyn NamespaceTx>)
		})
	}
}

struct RacingTx {
	tx: Box<dyn NamespaceTx>,
	rows: Arc<MemoryStore>,
	winner: Option<Namespace>,
}
impl NamespaceTx for RacingTx {
	fn find_namespace<'a>(
		&'a mut self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>> {
		self.tx.find_namespace(workspace_id, name_or_id)
	}

	fn insert_namespace<'a>(&'a mut self, namespace: &'a Namespace) -> StoreFuture<'a, ()> {
		self.tx.insert_namespace(namespace)
	}

	fn upsert_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
		limit: u64,
		duration_ms: u64,
	) -> StoreFuture<'a, Override> {
		self.tx.upsert_override(namespace_id, identifier, limit, duration_ms)
	}

	fn delete_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
	) -> StoreFuture<'a, Option<Override>> {
		self.tx.delete_override(namespace_id, identifier)
	}

	fn insert_audit_logs<'a>(&'a mut self, entries: &'a [AuditEntry]) -> StoreFuture<'a, ()> {
		self.tx.insert_audit_logs(entries)
	}

	fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
		Box::pin(async move {
			let Self { tx, rows, winner } = *self;

			if let Some(winner) = winner {
				let actor = KeyId::new("key_other").expect("Key fixture should be valid.");
				let mut other = rows.begin().await?;

				other.insert_namespace(&winner).await?;
				other.insert_audit_logs(&[AuditEntry::namespace_created(&winner, &actor)]).await?;
				other.commit().await?;
			}

			tx.commit().await
		})
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_auto_create_yields_one_row_and_one_audit_entry() {
	const CALLERS: usize = 16;

	let harness = build_test_broker();
	let ctx = context_with_grants(&workspace("ws_create"), GRANTS);
	let barrier = Arc::new(Barrier::new(CALLERS));
	let mut handles = Vec::with_capacity(CALLERS);

	for idx in 0..CALLERS {
		let broker = harness.broker.clone();
		let ctx = ctx.clone();
		let barrier = barrier.clone();

		handles.push(tokio::spawn(async move {
			barrier.wait().await;

			broker
				.limit(&ctx, RateLimitCheck::new("new_ns", format!("user_{idx}"), 10, 60_000))
				.await
		}));
	}

	let mut namespace_ids = BTreeSet::new();

	for handle in handles {
		let outcome = handle
			.await
			.expect("Limit task should not panic.")
			.expect("Every concurrent caller should succeed.");

		namespace_ids.insert(outcome.namespace_id);
	}

	assert_eq!(namespace_ids.len(), 1, "Every caller must observe the same namespace.");
	assert_eq!(harness.store.namespace_count(), 1);
	assert_eq!(harness.store.audit_logs().len(), 1);
	assert_eq!(harness.broker.creator.in_flight(), 0);
}

#[tokio::test]
async fn cross_process_winner_is_adopted() {
	let harness = build_test_broker();
	let ctx = context_with_grants(&workspace("ws_create"), GRANTS);

	// Cache the absence first so the next check goes straight to creation.
	let resolved = harness
		.broker
		.cache
		.resolve(&workspace("ws_create"), "raced")
		.await
		.expect("Resolve should succeed.");

	assert!(resolved.is_none());

	let winner = Namespace::new(workspace("ws_create"), "raced", OffsetDateTime::now_utc());

	harness.store.seed(winner.clone());

	let outcome = harness
		.broker
		.limit(&ctx, RateLimitCheck::new("raced", "user_1", 10, 60_000))
		.await
		.expect("Losing the insert race must not be an error.");

	assert_eq!(outcome.namespace_id, winner.id);
	assert_eq!(harness.store.namespace_count(), 1);
	assert!(harness.store.audit_logs().is_empty(), "Only the winner audits its insert.");
}

#[tokio::test]
async fn a_winner_committed_before_our_commit_is_adopted() {
	let rows = Arc::new(MemoryStore::default());
	let winner = Namespace::new(workspace("ws_create"), "raced", OffsetDateTime::now_utc());
	let store: Arc<dyn NamespaceStore> =
		Arc::new(RacingStore { rows: rows.clone(), winner: Mutex::new(Some(winner.clone())) });
	let broker = Broker::new(
		BrokerConfig::default(),
		store,
		Arc::new(MemoryLimiter::default()),
		Arc::new(NoopTelemetry),
	);
	let ctx = context_with_grants(&workspace("ws_create"), GRANTS);
	let outcome = broker
		.limit(&ctx, RateLimitCheck::new("raced", "user_1", 10, 60_000))
		.await
		.expect("Losing the commit race must not be an error.");
	let logs = rows.audit_logs();

	assert_eq!(outcome.namespace_id, winner.id);
	assert_eq!(rows.namespace_count(), 1);
	assert_eq!(logs.len(), 1, "Only the winner audits its insert.");
	assert_eq!(logs[0].actor.as_ref(), "key_other");
	assert_eq!(rows.commits(), 2);
}

#[tokio::test]
async fn transient_failures_are_retried_then_surfaced() {
	let config = BrokerConfig {
		create_retry: RetryPolicy { max_attempts: 2, backoff_ms: 1 },
		..BrokerConfig::default()
	};
	let harness = build_test_broker_with(config);
	let ctx = context_with_grants(&workspace("ws_create"), GRANTS);

	harness.store.fail_next_commits(1);
	harness
		.broker
		.limit(&ctx, RateLimitCheck::new("retried", "user_1", 10, 60_000))
		.await
		.expect("One transient failure should be absorbed by the retry.");

	harness.store.fail_next_commits(2);

	let err = harness
		.broker
		.limit(&ctx, RateLimitCheck::new("exhausted", "user_1", 10, 60_000))
		.await
		.expect_err("Exhausted retries must surface.");

	assert_eq!(err.kind(), ErrorKind::Internal);
	assert_ne!(err.public_message(), err.to_string(), "Internal details must stay private.");
	assert_eq!(harness.store.namespace_count(), 1);
	assert_eq!(harness.store.audit_logs().len(), 1);
}

#[tokio::test]
async fn names_are_scoped_to_their_workspace() {
	let harness = build_test_broker();
	let first = context_with_grants(&workspace("ws_one"), GRANTS);
	let second = context_with_grants(&workspace("ws_two"), GRANTS);
	let check = RateLimitCheck::new("shared", "user_1", 10, 60_000);
	let a =
		harness.broker.limit(&first, check.clone()).await.expect("First create should succeed.");
	let b = harness.broker.limit(&second, check).await.expect("Second create should succeed.");

	assert_ne!(a.namespace_id, b.namespace_id);
	assert_eq!(harness.store.namespace_count(), 2);
}
