//! Thread-safe in-memory [`NamespaceStore`] for local development and tests.
//!
//! Transactions stage their writes privately and publish them under a single write lock on
//! commit, so a namespace insert and its audit entry become visible together or not at all.
//! Every committed row carries a version; a transaction that staged a row whose version moved
//! before its commit fails with [`StoreError::Transient`] instead of overwriting the newer row.

// std
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	audit::AuditEntry,
	auth::{NamespaceId, WorkspaceId},
	namespace::{Namespace, Override},
	store::{NamespaceStore, NamespaceTx, StoreError, StoreFuture},
};

const UNIQUE_NAME_CONSTRAINT: &str = "ratelimit_namespaces_workspace_id_name_idx";

type NameKey = (WorkspaceId, String);

#[derive(Debug, Default)]
struct State {
	rows: HashMap<NamespaceId, Namespace>,
	versions: HashMap<NamespaceId, u64>,
	names: HashMap<NameKey, NamespaceId>,
	audit_logs: Vec<AuditEntry>,
}
impl State {
	fn find(&self, workspace_id: &WorkspaceId, name_or_id: &str) -> Option<&Namespace> {
		let by_name = self
			.names
			.get(&(workspace_id.clone(), name_or_id.to_owned()))
			.and_then(|id| self.rows.get(id));

		by_name.or_else(|| {
			self.rows.get(name_or_id).filter(|row| &row.workspace_id == workspace_id)
		})
	}

	fn name_taken(&self, namespace: &Namespace) -> bool {
		self.names.contains_key(&(namespace.workspace_id.clone(), namespace.name.clone()))
	}

	fn version(&self, namespace_id: &NamespaceId) -> u64 {
		self.versions.get(namespace_id).copied().unwrap_or_default()
	}

	fn bump(&mut self, namespace_id: &NamespaceId) {
		*self.versions.entry(namespace_id.clone()).or_default() += 1;
	}

	fn put(&mut self, namespace: Namespace) {
		self.bump(&namespace.id);
		self.names
			.insert((namespace.workspace_id.clone(), namespace.name.clone()), namespace.id.clone());
		self.rows.insert(namespace.id.clone(), namespace);
	}
}

#[derive(Debug, Default)]
struct Counters {
	reads: AtomicU64,
	commits: AtomicU64,
	failing_commits: AtomicU32,
}

/// Thread-safe storage backend that keeps namespace rows in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	state: Arc<RwLock<State>>,
	counters: Arc<Counters>,
}
impl MemoryStore {
	/// Writes a row directly, bypassing transactions (simulates another process).
	pub fn seed(&self, namespace: Namespace) {
		self.state.write().put(namespace);
	}

	/// Marks the addressed namespace as deleted; returns false if it does not exist.
	pub fn soft_delete(
		&self,
		workspace_id: &WorkspaceId,
		name_or_id: &str,
		instant: OffsetDateTime,
	) -> bool {
		let mut state = self.state.write();
		let Some(id) = state.find(workspace_id, name_or_id).map(|row| row.id.clone()) else {
			return false;
		};

		match state.rows.get_mut(&id) {
			Some(row) => {
				row.deleted_at = Some(instant);
				state.bump(&id);

				true
			},
			None => false,
		}
	}

	/// Committed audit entries in insertion order.
	pub fn audit_logs(&self) -> Vec<AuditEntry> {
		self.state.read().audit_logs.clone()
	}

	/// Number of committed namespace rows across all workspaces.
	pub fn namespace_count(&self) -> usize {
		self.state.read().rows.len()
	}

	/// Number of non-transactional read round trips served so far.
	pub fn reads(&self) -> u64 {
		self.counters.reads.load(Ordering::SeqCst)
	}

	/// Number of successful commits so far.
	pub fn commits(&self) -> u64 {
		self.counters.commits.load(Ordering::SeqCst)
	}

	/// Makes the next `count` commits fail with a transient error.
	pub fn fail_next_commits(&self, count: u32) {
		self.counters.failing_commits.store(count, Ordering::SeqCst);
	}

	fn find_now(&self, workspace_id: &WorkspaceId, name_or_id: &str) -> Option<Namespace> {
		self.counters.reads.fetch_add(1, Ordering::SeqCst);
		self.state.read().find(workspace_id, name_or_id).cloned()
	}

	fn find_many_now(&self, workspace_id: &WorkspaceId, names_or_ids: &[String]) -> Vec<Namespace> {
		self.counters.reads.fetch_add(1, Ordering::SeqCst);

		let state = self.state.read();
		let mut seen = HashSet::new();

		names_or_ids
			.iter()
			.filter_map(|key| state.find(workspace_id, key))
			.filter(|row| seen.insert(row.id.clone()))
			.cloned()
			.collect()
	}
}
impl NamespaceStore for MemoryStore {
	fn find_namespace<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>> {
		Box::pin(async move { Ok(self.find_now(workspace_id, name_or_id)) })
	}

	fn find_namespaces<'a>(
		&'a self,
		workspace_id: &'a WorkspaceId,
		names_or_ids: &'a [String],
	) -> StoreFuture<'a, Vec<Namespace>> {
		Box::pin(async move { Ok(self.find_many_now(workspace_id, names_or_ids)) })
	}

	fn begin(&self) -> StoreFuture<'_, Box<dyn NamespaceTx>> {
		let tx = MemoryTx {
			state: self.state.clone(),
			counters: self.counters.clone(),
			staged: HashMap::new(),
			read_versions: HashMap::new(),
			inserted: Vec::new(),
			audit_logs: Vec::new(),
		};

		Box::pin(async move { Ok(Box::new(tx) as Box<dyn NamespaceTx>) })
	}
}

/// Transaction over a [`MemoryStore`]; rolled back when dropped uncommitted.
#[derive(Debug)]
struct MemoryTx {
	state: Arc<RwLock<State>>,
	counters: Arc<Counters>,
	staged: HashMap<NamespaceId, Namespace>,
	read_versions: HashMap<NamespaceId, u64>,
	inserted: Vec<NamespaceId>,
	audit_logs: Vec<AuditEntry>,
}
impl MemoryTx {
	fn find_now(&self, workspace_id: &WorkspaceId, name_or_id: &str) -> Option<Namespace> {
		let staged = self.staged.values().find(|row| {
			&row.workspace_id == workspace_id && row.is_addressed_by(name_or_id)
		});

		match staged {
			Some(row) => Some(row.clone()),
			None => self.state.read().find(workspace_id, name_or_id).cloned(),
		}
	}

	fn insert_now(&mut self, namespace: &Namespace) -> Result<(), StoreError> {
		let staged_conflict = self.staged.values().any(|row| {
			row.workspace_id == namespace.workspace_id && row.name == namespace.name
		});

		if staged_conflict || self.state.read().name_taken(namespace) {
			return Err(StoreError::UniqueViolation { constraint: UNIQUE_NAME_CONSTRAINT.into() });
		}

		self.inserted.push(namespace.id.clone());
		self.staged.insert(namespace.id.clone(), namespace.clone());

		Ok(())
	}

	fn staged_row(&mut self, namespace_id: &NamespaceId) -> Result<&mut Namespace, StoreError> {
		if !self.staged.contains_key(namespace_id) {
			let state = self.state.read();
			let committed = state.rows.get(namespace_id).cloned().ok_or_else(|| {
				StoreError::Backend { message: format!("Namespace {namespace_id} does not exist") }
			})?;

			self.read_versions.insert(namespace_id.clone(), state.version(namespace_id));
			drop(state);
			self.staged.insert(namespace_id.clone(), committed);
		}

		self.staged.get_mut(namespace_id).ok_or_else(|| StoreError::Backend {
			message: format!("Namespace {namespace_id} vanished from the transaction"),
		})
	}

	fn commit_now(self) -> Result<(), StoreError> {
		let remaining = self.counters.failing_commits.load(Ordering::SeqCst);

		if remaining > 0 {
			self.counters.failing_commits.store(remaining - 1, Ordering::SeqCst);

			return Err(StoreError::Transient {
				message: "could not serialize access due to concurrent update".into(),
			});
		}

		let mut state = self.state.write();

		for (id, version) in &self.read_versions {
			if state.version(id) != *version {
				return Err(StoreError::Transient {
					message: format!("namespace {id} changed since it was read"),
				});
			}
		}
		for id in &self.inserted {
			if let Some(row) = self.staged.get(id)
				&& state.name_taken(row)
			{
				return Err(StoreError::Transient {
					message: format!("concurrent insert of namespace `{}`", row.name),
				});
			}
		}

		for row in self.staged.into_values() {
			state.put(row);
		}

		state.audit_logs.extend(self.audit_logs);
		self.counters.commits.fetch_add(1, Ordering::SeqCst);

		Ok(())
	}
}
impl NamespaceTx for MemoryTx {
	fn find_namespace<'a>(
		&'a mut self,
		workspace_id: &'a WorkspaceId,
		name_or_id: &'a str,
	) -> StoreFuture<'a, Option<Namespace>> {
		Box::pin(async move { Ok(self.find_now(workspace_id, name_or_id)) })
	}

	fn insert_namespace<'a>(&'a mut self, namespace: &'a Namespace) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.insert_now(namespace) })
	}

	fn upsert_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
		limit: u64,
		duration_ms: u64,
	) -> StoreFuture<'a, Override> {
		Box::pin(async move {
			let row = self.staged_row(namespace_id)?;
			let stored = row.overrides.upsert(identifier, limit, duration_ms);

			row.updated_at = Some(OffsetDateTime::now_utc());

			Ok(stored)
		})
	}

	fn delete_override<'a>(
		&'a mut self,
		namespace_id: &'a NamespaceId,
		identifier: &'a str,
	) -> StoreFuture<'a, Option<Override>> {
		Box::pin(async move {
			let row = self.staged_row(namespace_id)?;
			let removed = row.overrides.remove(identifier);

			if removed.is_some() {
				row.updated_at = Some(OffsetDateTime::now_utc());
			}

			Ok(removed)
		})
	}

	fn insert_audit_logs<'a>(&'a mut self, entries: &'a [AuditEntry]) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.audit_logs.extend_from_slice(entries);

			Ok(())
		})
	}

	fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
		Box::pin(async move { (*self).commit_now() })
	}
}
