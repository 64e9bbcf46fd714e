//! Read-through namespace cache with stale-while-revalidate aging and negative entries.
//!
//! Entries move through three states as they age (see [`EntryState`]). Fresh entries are served
//! directly. Stale entries are served immediately while a background task reloads them. Expired
//! or missing entries are loaded synchronously, with concurrent loads of the same key coalesced
//! into one datastore read. "Does not exist" answers are cached as [`CachedNamespace::Absent`] so
//! unknown names do not hit the store on every request.
//!
//! A loaded or created namespace is stored under both its name and its ID. Storage is a bounded
//! [`moka`] cache whose time-to-live covers the fresh and stale windows together, so expired
//! entries and the least recently used ones leave without a sweep over the whole table.
//!
//! Invalidation bumps an epoch; a load that read the store before the bump does not write its
//! result back.

mod metrics;

pub use self::metrics::CacheMetrics;

// std
use std::time::Duration as StdDuration;
// crates.io
use moka::{notification::RemovalCause, policy::EvictionPolicy, sync::Cache as MokaCache};
// self
use crate::{
	_prelude::*,
	auth::WorkspaceId,
	config::CacheConfig,
	namespace::Namespace,
	obs::{self, CacheOutcome},
	singleflight::Singleflight,
	store::NamespaceStore,
};

const MAX_RETENTION: StdDuration = StdDuration::from_secs(60 * 60 * 24 * 365 * 100);

type LoadResult = Result<Option<Arc<Namespace>>>;

/// Cache address: a namespace name or ID scoped to its workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// Owning workspace.
	pub workspace_id: WorkspaceId,
	/// Namespace name or ID.
	pub key: String,
}
impl CacheKey {
	/// Builds a key for the given workspace and name-or-ID.
	pub fn new(workspace_id: &WorkspaceId, key: impl Into<String>) -> Self {
		Self { workspace_id: workspace_id.clone(), key: key.into() }
	}
}

/// Cached payload: a namespace or the confirmed absence of one.
#[derive(Clone, Debug)]
pub enum CachedNamespace {
	/// The namespace exists (it may still be soft-deleted).
	Found(Arc<Namespace>),
	/// The store confirmed no such namespace.
	Absent,
}
impl CachedNamespace {
	fn into_option(self) -> Option<Arc<Namespace>> {
		match self {
			Self::Found(namespace) => Some(namespace),
			Self::Absent => None,
		}
	}
}

/// Age-derived state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
	/// Served without touching the store.
	Fresh,
	/// Served, with a background refresh scheduled.
	Stale,
	/// Must be reloaded before use.
	Expired,
}

/// Value plus the instant it was cached.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	/// Cached payload.
	pub value: CachedNamespace,
	/// Instant the payload was stored.
	pub cached_at: OffsetDateTime,
}
impl CacheEntry {
	/// Computes the entry state at `now` under the given windows.
	pub fn state_at(&self, now: OffsetDateTime, config: &CacheConfig) -> EntryState {
		let age = now - self.cached_at;
		let fresh = config.fresh();

		if age < fresh {
			EntryState::Fresh
		} else if age < fresh + config.stale() {
			EntryState::Stale
		} else {
			EntryState::Expired
		}
	}
}

/// Shared, explicitly constructed namespace cache. Cloning yields another handle to the same
/// entries.
#[derive(Clone)]
pub struct NamespaceCache {
	inner: Arc<Inner>,
}
impl NamespaceCache {
	/// Creates an empty cache reading through to `store`.
	pub fn new(config: CacheConfig, store: Arc<dyn NamespaceStore>) -> Self {
		let metrics = Arc::new(CacheMetrics::default());
		let entries = build_entries(&config, metrics.clone());

		Self {
			inner: Arc::new(Inner {
				config,
				store,
				entries,
				epoch: Mutex::new(0),
				loads: Singleflight::default(),
				refreshing: Mutex::new(HashSet::new()),
				metrics,
			}),
		}
	}

	/// Resolves a namespace by name or ID, consulting the store only when necessary.
	pub async fn resolve(
		&self,
		workspace_id: &WorkspaceId,
		name_or_id: &str,
	) -> Result<Option<Arc<Namespace>>> {
		let key = CacheKey::new(workspace_id, name_or_id);

		if let Some(value) = self.serve_cached(&key) {
			return Ok(value.into_option());
		}

		self.inner.metrics.record(CacheOutcome::Miss);

		Inner::load(self.inner.clone(), key).await
	}

	/// Resolves many names or IDs, loading every unusable entry in a single store round trip.
	///
	/// The returned map is keyed by the caller's strings; keys that do not exist are absent.
	pub async fn resolve_many(
		&self,
		workspace_id: &WorkspaceId,
		names_or_ids: &[String],
	) -> Result<HashMap<String, Arc<Namespace>>> {
		let mut found = HashMap::new();
		let mut to_load = Vec::new();
		let mut seen = HashSet::new();

		for name_or_id in names_or_ids.iter().filter(|key| seen.insert(key.as_str())) {
			let key = CacheKey::new(workspace_id, name_or_id.as_str());

			match self.serve_cached(&key) {
				Some(CachedNamespace::Found(namespace)) => {
					found.insert(name_or_id.clone(), namespace);
				},
				Some(CachedNamespace::Absent) => {},
				None => {
					self.inner.metrics.record(CacheOutcome::Miss);
					to_load.push(name_or_id.clone());
				},
			}
		}

		if to_load.is_empty() {
			return Ok(found);
		}

		self.inner.metrics.record_load();

		let epoch = self.inner.current_epoch();
		let rows = self.inner.store.find_namespaces(workspace_id, &to_load).await?;
		let now = OffsetDateTime::now_utc();
		let rows: Vec<Arc<Namespace>> = rows.into_iter().map(Arc::new).collect();
		let mut writes = Vec::with_capacity(to_load.len() + rows.len());

		for row in &rows {
			writes.extend(Inner::namespace_entries(row.clone()));
		}
		for name_or_id in to_load {
			match rows.iter().find(|row| row.is_addressed_by(&name_or_id)) {
				Some(row) => {
					found.insert(name_or_id, row.clone());
				},
				None => {
					writes.push((CacheKey::new(workspace_id, name_or_id), CachedNamespace::Absent));
				},
			}
		}

		self.inner.put_unless_invalidated(epoch, writes, now);

		Ok(found)
	}

	/// Stores `namespace` under both its name and its ID, replacing any negative entry.
	pub fn insert(&self, namespace: Arc<Namespace>) {
		self.inner.put_namespace(namespace, OffsetDateTime::now_utc());
	}

	/// Drops the entries for `namespace` so the next lookup reloads it.
	///
	/// Loads that read the store before this call keep their result out of the cache.
	pub fn invalidate(&self, namespace: &Namespace) {
		let by_name = CacheKey::new(&namespace.workspace_id, namespace.name.as_str());
		let by_id = CacheKey::new(&namespace.workspace_id, namespace.id.as_ref());
		let mut epoch = self.inner.epoch.lock();

		*epoch += 1;

		self.inner.entries.invalidate(&by_name);
		self.inner.entries.invalidate(&by_id);
	}

	/// Returns the raw entry for a key, if one is cached.
	pub fn peek(&self, workspace_id: &WorkspaceId, name_or_id: &str) -> Option<CacheEntry> {
		self.inner.entries.get(&CacheKey::new(workspace_id, name_or_id))
	}

	/// Number of cached keys; pending evictions are applied first so the count is exact.
	pub fn len(&self) -> usize {
		self.inner.entries.run_pending_tasks();

		usize::try_from(self.inner.entries.entry_count()).unwrap_or(usize::MAX)
	}

	/// Returns true if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Counters describing how lookups were served.
	pub fn metrics(&self) -> &CacheMetrics {
		&self.inner.metrics
	}

	/// Serves a fresh or stale entry, scheduling a refresh for the latter.
	fn serve_cached(&self, key: &CacheKey) -> Option<CachedNamespace> {
		let (value, state) = self.inner.lookup(key, OffsetDateTime::now_utc())?;
		let outcome = match (&value, state) {
			(_, EntryState::Expired) => return None,
			(CachedNamespace::Absent, _) => CacheOutcome::Negative,
			(_, EntryState::Fresh) => CacheOutcome::Fresh,
			(_, EntryState::Stale) => CacheOutcome::Stale,
		};

		self.inner.metrics.record(outcome);

		if state == EntryState::Stale {
			self.schedule_refresh(key.clone());
		}

		Some(value)
	}

	fn schedule_refresh(&self, key: CacheKey) {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return;
		};

		if !self.inner.refreshing.lock().insert(key.clone()) {
			return;
		}

		let inner = self.inner.clone();

		handle.spawn(async move {
			if let Err(err) = Inner::load(inner.clone(), key.clone()).await {
				obs::warn_refresh_failed(&key.workspace_id, &key.key, &err);
			}

			inner.refreshing.lock().remove(&key);
		});
	}
}
impl Debug for NamespaceCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NamespaceCache")
			.field("config", &self.inner.config)
			.field("entries", &self.inner.entries.entry_count())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}

struct Inner {
	config: CacheConfig,
	store: Arc<dyn NamespaceStore>,
	entries: MokaCache<CacheKey, CacheEntry>,
	epoch: Mutex<u64>,
	loads: Singleflight<CacheKey, LoadResult>,
	refreshing: Mutex<HashSet<CacheKey>>,
	metrics: Arc<CacheMetrics>,
}
impl Inner {
	async fn load(inner: Arc<Self>, key: CacheKey) -> LoadResult {
		let this = inner.clone();

		inner
			.loads
			.run(key.clone(), move || async move {
				let now = OffsetDateTime::now_utc();

				if let Some((value, EntryState::Fresh)) = this.lookup(&key, now) {
					return Ok(value.into_option());
				}

				this.metrics.record_load();

				let epoch = this.current_epoch();
				let row = this.store.find_namespace(&key.workspace_id, &key.key).await?;
				let now = OffsetDateTime::now_utc();

				match row {
					Some(row) => {
						let row = Arc::new(row);
						let mut writes = Vec::from(Self::namespace_entries(row.clone()));

						writes.push((key, CachedNamespace::Found(row.clone())));
						this.put_unless_invalidated(epoch, writes, now);

						Ok(Some(row))
					},
					None => {
						let writes = vec![(key, CachedNamespace::Absent)];

						this.put_unless_invalidated(epoch, writes, now);

						Ok(None)
					},
				}
			})
			.await
	}

	fn lookup(&self, key: &CacheKey, now: OffsetDateTime) -> Option<(CachedNamespace, EntryState)> {
		let entry = self.entries.get(key)?;
		let state = entry.state_at(now, &self.config);

		Some((entry.value, state))
	}

	fn current_epoch(&self) -> u64 {
		*self.epoch.lock()
	}

	fn namespace_entries(namespace: Arc<Namespace>) -> [(CacheKey, CachedNamespace); 2] {
		let by_name = CacheKey::new(&namespace.workspace_id, namespace.name.as_str());
		let by_id = CacheKey::new(&namespace.workspace_id, namespace.id.as_ref());

		[
			(by_name, CachedNamespace::Found(namespace.clone())),
			(by_id, CachedNamespace::Found(namespace)),
		]
	}

	fn put_namespace(&self, namespace: Arc<Namespace>, now: OffsetDateTime) {
		for (key, value) in Self::namespace_entries(namespace) {
			self.entries.insert(key, CacheEntry { value, cached_at: now });
		}
	}

	/// Writes `entries` unless an invalidation happened since `epoch` was read.
	fn put_unless_invalidated(
		&self,
		epoch: u64,
		entries: Vec<(CacheKey, CachedNamespace)>,
		now: OffsetDateTime,
	) {
		let current = self.epoch.lock();

		if *current != epoch {
			return;
		}

		for (key, value) in entries {
			self.entries.insert(key, CacheEntry { value, cached_at: now });
		}
	}
}

fn build_entries(
	config: &CacheConfig,
	metrics: Arc<CacheMetrics>,
) -> MokaCache<CacheKey, CacheEntry> {
	MokaCache::builder()
		.max_capacity(u64::try_from(config.max_entries).unwrap_or(u64::MAX))
		.time_to_live(config.retention().min(MAX_RETENTION))
		.eviction_policy(EvictionPolicy::lru())
		.eviction_listener(move |_key, _value, cause| {
			if matches!(cause, RemovalCause::Size) {
				metrics.record_eviction();
			}
		})
		.build()
}
