#![cfg(feature = "test")]

// std
use std::time::Duration as StdDuration;
// self
use ratelimit_broker::{
	_preludet::*,
	auth::WorkspaceId,
	cache::{CachedNamespace, NamespaceCache},
	config::CacheConfig,
	namespace::Namespace,
	store::{MemoryStore, NamespaceStore},
};

fn workspace_id() -> WorkspaceId {
	workspace("ws_cache_it")
}

fn cache(config: CacheConfig) -> (NamespaceCache, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let store_dyn: Arc<dyn NamespaceStore> = store.clone();

	(NamespaceCache::new(config, store_dyn), store)
}

async fn wait_for_reads(store: &MemoryStore, expected: u64) {
	for _ in 0..100 {
		if store.reads() >= expected {
			return;
		}

		tokio::time::sleep(StdDuration::from_millis(5)).await;
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_entries_are_served_while_refreshing() {
	let (cache, store) = cache(CacheConfig { fresh_ms: 0, stale_ms: 60_000, max_entries: 16 });
	let mut namespace = Namespace::new(workspace_id(), "api", OffsetDateTime::now_utc());

	store.seed(namespace.clone());

	let first = cache
		.resolve(&workspace_id(), "api")
		.await
		.expect("Resolve should succeed.")
		.expect("Seeded namespace should exist.");

	assert!(first.updated_at.is_none());

	namespace.updated_at = Some(OffsetDateTime::now_utc());
	store.seed(namespace);

	let stale = cache
		.resolve(&workspace_id(), "api")
		.await
		.expect("Resolve should succeed.")
		.expect("Stale namespace should be served.");

	assert!(stale.updated_at.is_none(), "The stale copy is served immediately.");
	assert_eq!(cache.metrics().stale_hits(), 1);

	wait_for_reads(&store, 2).await;
	tokio::time::sleep(StdDuration::from_millis(20)).await;

	let refreshed =
		cache.peek(&workspace_id(), "api").expect("Refreshed entry should be cached.");

	assert!(matches!(
		refreshed.value,
		CachedNamespace::Found(ref row) if row.updated_at.is_some()
	));
}

#[tokio::test]
async fn negative_entries_hide_new_rows_until_they_expire() {
	let (cache, store) = cache(CacheConfig { fresh_ms: 50, stale_ms: 0, max_entries: 16 });

	assert!(cache.resolve(&workspace_id(), "late").await.expect("Resolve works.").is_none());

	store.seed(Namespace::new(workspace_id(), "late", OffsetDateTime::now_utc()));

	assert!(
		cache.resolve(&workspace_id(), "late").await.expect("Resolve works.").is_none(),
		"A fresh negative entry is served without a read."
	);
	assert_eq!(store.reads(), 1);

	tokio::time::sleep(StdDuration::from_millis(80)).await;

	assert!(cache.resolve(&workspace_id(), "late").await.expect("Resolve works.").is_some());
	assert_eq!(store.reads(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_read() {
	let (cache, store) = cache(CacheConfig::default());

	store.seed(Namespace::new(workspace_id(), "hot", OffsetDateTime::now_utc()));

	let mut handles = Vec::new();

	for _ in 0..8 {
		let cache = cache.clone();

		handles.push(tokio::spawn(async move {
			cache.resolve(&workspace_id(), "hot").await.map(|found| found.map(|row| row.id.clone()))
		}));
	}

	let mut ids = HashSet::new();

	for handle in handles {
		let id = handle
			.await
			.expect("Resolve task should not panic.")
			.expect("Resolve should succeed.")
			.expect("Seeded namespace should exist.");

		ids.insert(id);
	}

	assert_eq!(ids.len(), 1);
	assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn batch_resolution_uses_one_read_and_caches_both_keys() {
	let (cache, store) = cache(CacheConfig::default());
	let a = Namespace::new(workspace_id(), "a", OffsetDateTime::now_utc());

	store.seed(a.clone());

	let keys = ["a".to_string(), "missing".to_string(), "a".to_string()];
	let found = cache.resolve_many(&workspace_id(), &keys).await.expect("Batch resolve works.");

	assert_eq!(found.len(), 1);
	assert_eq!(store.reads(), 1);

	let again = cache
		.resolve_many(&workspace_id(), &[a.id.to_string(), "missing".to_string()])
		.await
		.expect("Batch resolve works.");

	assert_eq!(again.get(a.id.as_ref()).map(|row| row.name.clone()), Some("a".to_string()));
	assert_eq!(store.reads(), 1, "ID and negative entries must be served from the cache.");
	assert_eq!(cache.metrics().loads(), 1);
}
