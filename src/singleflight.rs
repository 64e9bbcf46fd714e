//! Keyed coalescing of concurrent identical operations.
//!
//! A [`Singleflight`] maps each key to a one-shot cell. The first caller for a key runs the
//! operation; callers that arrive while it is in flight wait on the same cell and receive a clone
//! of its result. Distinct keys never wait on each other. Once the call completes the key is
//! forgotten, so a later caller starts a fresh execution.
//!
//! Dropping the executing caller's future before completion leaves the cell empty, and one of
//! the waiters takes over execution.

// self
use crate::_prelude::*;

/// Group of in-flight calls keyed by `K` producing `V`.
pub struct Singleflight<K, V> {
	calls: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}
impl<K, V> Singleflight<K, V>
where
	K: Clone + Eq + Hash,
	V: Clone,
{
	/// Runs `operation` for `key`, or joins the execution already in flight for it.
	pub async fn run<F, Fut>(&self, key: K, operation: F) -> V
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = V>,
	{
		let cell = {
			let mut calls = self.calls.lock();

			calls.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
		};
		let value = cell.get_or_init(operation).await.clone();

		{
			let mut calls = self.calls.lock();

			if calls.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
				calls.remove(&key);
			}
		}

		value
	}

	/// Number of keys with a call currently in flight.
	pub fn in_flight(&self) -> usize {
		self.calls.lock().len()
	}
}
impl<K, V> Default for Singleflight<K, V> {
	fn default() -> Self {
		Self { calls: Mutex::new(HashMap::new()) }
	}
}
impl<K, V> Debug for Singleflight<K, V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Singleflight").field("in_flight", &self.calls.lock().len()).finish()
	}
}
