//! Fire-and-forget buffering of per-check rate-limit events.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{NamespaceId, OverrideId, WorkspaceId},
};

/// Event buffered after every evaluated check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatelimitEvent {
	/// Request the check belonged to.
	pub request_id: String,
	/// Workspace of the caller.
	pub workspace_id: WorkspaceId,
	/// Instant the check was evaluated at.
	pub time: OffsetDateTime,
	/// Namespace the check ran in.
	pub namespace_id: NamespaceId,
	/// Identifier that was limited.
	pub identifier: String,
	/// Whether the check passed.
	pub passed: bool,
	/// Time spent in the limiter; batch checks report an equal share of the batch latency.
	pub latency: Duration,
	/// Override applied, if any.
	pub override_id: Option<OverrideId>,
	/// Effective limit after the check.
	pub limit: u64,
	/// Remaining units after the check.
	pub remaining: u64,
	/// Instant the window resets.
	pub reset_at: OffsetDateTime,
}

/// Destination for [`RatelimitEvent`]s.
///
/// Implementations must return promptly and never fail; losing an event is preferable to delaying
/// a response.
pub trait TelemetrySink
where
	Self: Send + Sync,
{
	/// Queues an event for asynchronous delivery.
	fn buffer(&self, event: RatelimitEvent);
}

/// Sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;
impl TelemetrySink for NoopTelemetry {
	fn buffer(&self, _: RatelimitEvent) {}
}

/// Bounded in-memory sink; events beyond capacity are dropped and counted.
#[derive(Debug)]
pub struct MemoryTelemetry {
	capacity: usize,
	events: Mutex<Vec<RatelimitEvent>>,
	dropped: AtomicU64,
}
impl MemoryTelemetry {
	/// Creates a sink that keeps at most `capacity` events.
	pub fn with_capacity(capacity: usize) -> Self {
		Self { capacity, events: Mutex::new(Vec::new()), dropped: AtomicU64::new(0) }
	}

	/// Snapshot of the buffered events in arrival order.
	pub fn events(&self) -> Vec<RatelimitEvent> {
		self.events.lock().clone()
	}

	/// Removes and returns every buffered event.
	pub fn drain(&self) -> Vec<RatelimitEvent> {
		std::mem::take(&mut *self.events.lock())
	}

	/// Number of events dropped because the buffer was full.
	pub fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}
impl TelemetrySink for MemoryTelemetry {
	fn buffer(&self, event: RatelimitEvent) {
		let mut events = self.events.lock();

		if events.len() >= self.capacity {
			self.dropped.fetch_add(1, Ordering::Relaxed);
		} else {
			events.push(event);
		}
	}
}
