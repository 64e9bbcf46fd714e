//! Datastore contracts consumed by the broker, the retrying transaction runner, and the in-memory
//! reference store.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	audit::AuditEntry,
	auth::{NamespaceId, WorkspaceId},
	config::RetryPolicy,
	namespace::{Namespace, Override},
};

/// Boxed future returned by datastore operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Read access plus transaction entry point for namespace rows.
///
/// Every returned [`Namespace`] carries its full override set.
pub trait NamespaceStore
where
	Self: Send + Sync,
{
	/// Finds a namespace in the workspace whose name or ID equals `name_or_id`.
	fn find_namespace<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>>;

	/// Finds every namespace addressed by one of `names_or_ids` in a single round trip.
	///
	/// Keys without a matching row are simply absent from the result.
	fn find_namespaces<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		names_or_ids: &'a [String],
	) -> StoreFuture<'a, Vec<Namespace>>;

	/// Opens a transaction. Dropping it without [`NamespaceTx::commit`] rolls it back.
	fn begin(&self) -> StoreFuture<'_, Box<dyn NamespaceTx>>;
}

/// Unit of atomic work against the datastore.
pub trait NamespaceTx
where
	Self: Send,
{
	/// Same lookup as [`NamespaceStore::find_namespace`], seeing this transaction's writes.
	fn find_namespace<'a>(
		&'a mut self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>>;

	/// Inserts a namespace row; fails with [`StoreError::UniqueViolation`] when the
	/// `(workspace, name)` pair is taken.
	fn insert_namespace<'a>(&'a mut self, namespace: &'a Namespace) -> StoreFuture<'a, ()>;

	/// Creates or updates the override keyed by `(namespace, identifier)`, re-using its ID.
	fn upsert_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
		limit: u64,
		duration_ms: u64,
	) -> StoreFuture<'a, Override>;

	/// Removes the override keyed by `(namespace, identifier)`, returning it if it existed.
	fn delete_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
	) -> StoreFuture<'a, Option<Override>>;

	/// Appends audit entries that become visible only if the transaction commits.
	fn insert_audit_logs<'a>(&'a mut self, entries: &'a [AuditEntry]) -> StoreFuture<'a, ()>;

	/// Commits every write of the transaction at once.
	fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Error type produced by [`NamespaceStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A uniqueness constraint rejected the write.
	#[error("Unique constraint `{constraint}` was violated.")]
	UniqueViolation {
		/// Name of the violated constraint.
		constraint: String,
	},
	/// Temporary failure (deadlock, serialization conflict, lost connection); safe to retry.
	#[error("Transient datastore failure: {message}.")]
	Transient {
		/// Human-readable error payload.
		message: String,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Returns true if the operation may succeed when attempted again.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient { .. })
	}

	/// Returns true for uniqueness violations.
	pub fn is_unique_violation(&self) -> bool {
		matches!(self, Self::UniqueViolation { .. })
	}
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts `policy`.
///
/// Only [`StoreError::is_transient`] failures are retried; the last error is returned once the
/// attempt budget is spent.
pub async fn run_with_retry<T, F, Fut>(
	policy: &RetryPolicy,
	mut operation: F,
) -> Result<T, StoreError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, StoreError>>,
{
	let max_attempts = policy.max_attempts.max(1);
	let mut attempt = 0;

	loop {
		attempt += 1;

		match operation().await {
			Err(err) if err.is_transient() && attempt < max_attempts => {
				tokio::time::sleep(policy.backoff(attempt)).await;
			},
			result => return result,
		}
	}
}
