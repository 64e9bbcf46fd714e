//! High-level flow orchestrators powered by the broker facade.

pub mod common;

mod create;
mod limit;
mod limit_many;
mod overrides;

pub use common::*;
pub use create::NamespaceCreator;

// self
use crate::{
	_prelude::*,
	auth::{Action, Permission},
	cache::NamespaceCache,
	config::BrokerConfig,
	limiter::Limiter,
	namespace::Namespace,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::NamespaceStore,
	telemetry::TelemetrySink,
};

/// Resolves namespaces and overrides in front of a [`Limiter`].
///
/// The broker owns the namespace cache, the auto-create coordinator, and the collaborator
/// handles so individual flows can focus on their own ordering rules. Every handle is shared, so
/// cloning a broker is cheap and clones observe the same cache and in-flight calls.
#[derive(Clone)]
pub struct Broker {
	/// Configuration the broker was built with.
	pub config: BrokerConfig,
	/// Shared namespace cache.
	pub cache: NamespaceCache,
	/// Deduplicating namespace creator.
	pub creator: Arc<NamespaceCreator>,
	/// Datastore holding namespaces, overrides and audit logs.
	pub store: Arc<dyn NamespaceStore>,
	/// Rate-limit engine.
	pub limiter: Arc<dyn Limiter>,
	/// Destination for per-check events.
	pub telemetry: Arc<dyn TelemetrySink>,
	/// Shared counters for evaluated checks.
	pub flow_metrics: Arc<FlowMetrics>,
}
impl Broker {
	/// Wires a broker, its cache, and its creator around the provided collaborators.
	pub fn new(
		config: BrokerConfig,
		store: Arc<dyn NamespaceStore>,
		limiter: Arc<dyn Limiter>,
		telemetry: Arc<dyn TelemetrySink>,
	) -> Self {
		let cache = NamespaceCache::new(config.cache.clone(), store.clone());
		let creator = Arc::new(NamespaceCreator::new(
			store.clone(),
			cache.clone(),
			config.create_retry.clone(),
		));

		Self {
			config,
			cache,
			creator,
			store,
			limiter,
			telemetry,
			flow_metrics: Default::default(),
		}
	}

	/// Returns the cached namespace, auto-creating it when the caller may do so.
	async fn resolve_or_create(&self, ctx: &CheckContext, name: &str) -> Result<Arc<Namespace>> {
		if let Some(namespace) = self.cache.resolve(&ctx.workspace_id, name).await? {
			return Ok(namespace);
		}

		ctx.authorize(&Permission::any(Action::CreateNamespace).into()).await?;

		self.creator.create_if_missing(&ctx.workspace_id, name, &ctx.key_id).await
	}

	/// Runs `fut` inside a flow span and records its attempt and outcome.
	async fn observe<T, Fut>(&self, kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let span = FlowSpan::new(kind, stage);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(fut).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => {
				self.flow_metrics.record_failure();
				obs::record_flow_outcome(kind, FlowOutcome::Failure);
			},
		}

		result
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("config", &self.config)
			.field("cache", &self.cache)
			.field("flow_metrics", &self.flow_metrics)
			.finish()
	}
}
