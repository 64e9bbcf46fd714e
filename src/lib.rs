//! Multi-tenant namespace and override resolution that sits in front of a rate-limit engine:
//! cached namespace lookups, singleflight auto-create, and ordered batch checks that always
//! report every outcome.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod flows;
pub mod limiter;
pub mod namespace;
pub mod obs;
pub mod singleflight;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{Authorizer, GrantSet, KeyId, WorkspaceId},
		config::BrokerConfig,
		flows::{Broker, CheckContext},
		limiter::{Limiter, MemoryLimiter},
		store::{MemoryStore, NamespaceStore},
		telemetry::{MemoryTelemetry, TelemetrySink},
	};

	/// Handles to the in-memory collaborators wired into a test broker.
	#[derive(Clone, Debug)]
	pub struct TestHarness {
		/// Broker under test.
		pub broker: Broker,
		/// Backing datastore.
		pub store: Arc<MemoryStore>,
		/// Backing limiter.
		pub limiter: Arc<MemoryLimiter>,
		/// Telemetry buffer.
		pub telemetry: Arc<MemoryTelemetry>,
	}

	/// Constructs a [`Broker`] backed entirely by in-memory collaborators.
	pub fn build_test_broker() -> TestHarness {
		build_test_broker_with(BrokerConfig::default())
	}

	/// Same as [`build_test_broker`] but with a caller-provided configuration.
	pub fn build_test_broker_with(config: BrokerConfig) -> TestHarness {
		let store = Arc::new(MemoryStore::default());
		let limiter = Arc::new(MemoryLimiter::default());
		let telemetry = Arc::new(MemoryTelemetry::with_capacity(1_024));
		let store_dyn: Arc<dyn NamespaceStore> = store.clone();
		let limiter_dyn: Arc<dyn Limiter> = limiter.clone();
		let telemetry_dyn: Arc<dyn TelemetrySink> = telemetry.clone();
		let broker = Broker::new(config, store_dyn, limiter_dyn, telemetry_dyn);

		TestHarness { broker, store, limiter, telemetry }
	}

	/// Builds a workspace identifier fixture.
	pub fn workspace(value: &str) -> WorkspaceId {
		WorkspaceId::new(value).expect("Workspace fixture should be valid.")
	}

	/// Builds a request context whose caller holds exactly the provided permissions.
	pub fn context_with_grants<I, S>(workspace_id: &WorkspaceId, grants: I) -> CheckContext
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let authorizer: Arc<dyn Authorizer> = Arc::new(GrantSet::new(grants));
		let key = KeyId::new("key_test").expect("Key fixture should be valid.");

		CheckContext::new(workspace_id.clone(), key, authorizer).with_telemetry(true)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::OnceCell;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}
