//! Auto-creation of namespaces on first use.
//!
//! Concurrent creators for the same `(workspace, name)` in this process share one execution via
//! [`Singleflight`]. Creators in other processes are reconciled by the datastore's unique
//! `(workspace, name)` index: losing the insert race re-reads the winning row inside the same
//! transaction. The insert and its audit entry commit together, and the result is written to the
//! cache under both its name and its ID.

// self
use crate::{
	_prelude::*,
	audit::AuditEntry,
	auth::{KeyId, WorkspaceId},
	cache::NamespaceCache,
	config::RetryPolicy,
	namespace::Namespace,
	obs::{FlowKind, FlowSpan},
	singleflight::Singleflight,
	store::{self, NamespaceStore, NamespaceTx, StoreError},
};

type CreateKey = (WorkspaceId, String);

/// Coordinates create-if-absent for namespaces.
pub struct NamespaceCreator {
	store: Arc<dyn NamespaceStore>,
	cache: NamespaceCache,
	retry: RetryPolicy,
	inflight: Singleflight<CreateKey, Result<Arc<Namespace>>>,
}
impl NamespaceCreator {
	/// Creates a coordinator that warms `cache` after every successful create.
	pub fn new(store: Arc<dyn NamespaceStore>, cache: NamespaceCache, retry: RetryPolicy) -> Self {
		Self { store, cache, retry, inflight: Singleflight::default() }
	}

	/// Returns the namespace named `name`, inserting it (with an audit entry) if it does not exist.
	///
	/// The caller is expected to have checked the cache and the create permission already.
	pub async fn create_if_missing(
		&self,
		workspace_id: &WorkspaceId,
		name: &str,
		actor: &KeyId,
	) -> Result<Arc<Namespace>> {
		let span = FlowSpan::new(FlowKind::CreateNamespace, "create_if_missing");
		let key = (workspace_id.clone(), name.to_owned());

		span.instrument(self.inflight.run(key, move || async move {
			let namespace = store::run_with_retry(&self.retry, move || {
				self.create_once(workspace_id, name, actor)
			})
			.await?;
			let namespace = Arc::new(namespace);

			self.cache.insert(namespace.clone());

			Ok(namespace)
		}))
		.await
	}

	/// Batch variant of [`Self::create_if_missing`]: every missing name is inserted in one
	/// transaction.
	///
	/// Duplicate names are created once. The result maps each requested name to its row.
	pub async fn create_many(
		&self,
		workspace_id: &WorkspaceId,
		names: &[String],
		actor: &KeyId,
	) -> Result<HashMap<String, Arc<Namespace>>> {
		let span = FlowSpan::new(FlowKind::CreateNamespace, "create_many");
		let mut seen = HashSet::new();
		let names: Vec<&str> =
			names.iter().map(String::as_str).filter(|name| seen.insert(*name)).collect();

		if names.is_empty() {
			return Ok(HashMap::new());
		}

		let names = names.as_slice();
		let rows = span
			.instrument(store::run_with_retry(&self.retry, move || {
				self.create_many_once(workspace_id, names, actor)
			}))
			.await?;
		let mut created = HashMap::with_capacity(rows.len());

		for (name, row) in names.iter().zip(rows) {
			let row = Arc::new(row);

			self.cache.insert(row.clone());
			created.insert((*name).to_owned(), row);
		}

		Ok(created)
	}

	/// Number of distinct creates currently in flight.
	pub fn in_flight(&self) -> usize {
		self.inflight.in_flight()
	}

	async fn create_once(
		&self,
		workspace_id: &WorkspaceId,
		name: &str,
		actor: &KeyId,
	) -> Result<Namespace, StoreError> {
		let mut tx = self.store.begin().await?;
		let mut audit_logs = Vec::with_capacity(1);
		let namespace =
			insert_or_reread(tx.as_mut(), workspace_id, name, actor, &mut audit_logs).await?;

		if !audit_logs.is_empty() {
			tx.insert_audit_logs(&audit_logs).await?;
		}

		tx.commit().await?;

		Ok(namespace)
	}

	async fn create_many_once(
		&self,
		workspace_id: &WorkspaceId,
		names: &[&str],
		actor: &KeyId,
	) -> Result<Vec<Namespace>, StoreError> {
		let mut tx = self.store.begin().await?;
		let mut audit_logs = Vec::with_capacity(names.len());
		let mut rows = Vec::with_capacity(names.len());

		for name in names {
			let row =
				insert_or_reread(tx.as_mut(), workspace_id, name, actor, &mut audit_logs).await?;

			rows.push(row);
		}

		if !audit_logs.is_empty() {
			tx.insert_audit_logs(&audit_logs).await?;
		}

		tx.commit().await?;

		Ok(rows)
	}
}
impl Debug for NamespaceCreator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NamespaceCreator")
			.field("retry", &self.retry)
			.field("inflight", &self.inflight)
			.finish()
	}
}

/// Inserts a fresh row or, when another writer already owns the name, reads theirs.
///
/// An audit entry is queued only for rows this transaction inserted.
async fn insert_or_reread(
	tx: &mut dyn NamespaceTx,
	workspace_id: &WorkspaceId,
	name: &str,
	actor: &KeyId,
	audit_logs: &mut Vec<AuditEntry>,
) -> Result<Namespace, StoreError> {
	let candidate = Namespace::new(workspace_id.clone(), name, OffsetDateTime::now_utc());

	match tx.insert_namespace(&candidate).await {
		Ok(()) => {
			audit_logs.push(AuditEntry::namespace_created(&candidate, actor));

			Ok(candidate)
		},
		Err(err) if err.is_unique_violation() => tx
			.find_namespace(workspace_id, name)
			.await?
			.ok_or_else(|| StoreError::Transient {
				message: format!("namespace `{name}` vanished after a unique violation"),
			}),
		Err(err) => Err(err),
	}
}
