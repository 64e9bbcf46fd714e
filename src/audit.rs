//! Audit entries written in the same transaction as the change they describe.

// self
use crate::{
	_prelude::*,
	auth::{AuditLogId, KeyId, WorkspaceId},
	namespace::{Namespace, Override},
};

/// Audited events emitted by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEvent {
	/// A namespace was auto-created.
	#[serde(rename = "ratelimit_namespace.create")]
	NamespaceCreate,
	/// An override was created or updated.
	#[serde(rename = "ratelimit_override.set")]
	OverrideSet,
	/// An override was deleted.
	#[serde(rename = "ratelimit_override.delete")]
	OverrideDelete,
}
impl AuditEvent {
	/// Returns the stable event label.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuditEvent::NamespaceCreate => "ratelimit_namespace.create",
			AuditEvent::OverrideSet => "ratelimit_override.set",
			AuditEvent::OverrideDelete => "ratelimit_override.delete",
		}
	}
}

/// Object touched by an audited event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditResource {
	/// Resource type label.
	pub kind: String,
	/// Resource identifier.
	pub id: String,
	/// Human-readable name, when the resource has one.
	pub name: Option<String>,
	/// Free-form structured details.
	pub meta: serde_json::Value,
}

/// One persisted audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
	/// Generated identifier.
	pub id: AuditLogId,
	/// Workspace the event belongs to.
	pub workspace_id: WorkspaceId,
	/// Event label.
	pub event: AuditEvent,
	/// Root key that caused the event.
	pub actor: KeyId,
	/// Sentence describing the change.
	pub description: String,
	/// Objects affected by the change.
	pub resources: Vec<AuditResource>,
	/// Event instant.
	pub time: OffsetDateTime,
}
impl AuditEntry {
	/// Entry recording the creation of `namespace` by `actor`.
	pub fn namespace_created(namespace: &Namespace, actor: &KeyId) -> Self {
		Self {
			id: AuditLogId::generate(),
			workspace_id: namespace.workspace_id.clone(),
			event: AuditEvent::NamespaceCreate,
			actor: actor.clone(),
			description: format!("Created {}", namespace.id),
			resources: vec![namespace_resource(namespace)],
			time: namespace.created_at,
		}
	}

	/// Entry recording an override upsert or deletion.
	pub fn override_changed(
		event: AuditEvent,
		namespace: &Namespace,
		item: &Override,
		actor: &KeyId,
		time: OffsetDateTime,
	) -> Self {
		let verb = if matches!(event, AuditEvent::OverrideDelete) { "Deleted" } else { "Set" };

		Self {
			id: AuditLogId::generate(),
			workspace_id: namespace.workspace_id.clone(),
			event,
			actor: actor.clone(),
			description: format!("{verb} {} on {}", item.id, namespace.id),
			resources: vec![
				namespace_resource(namespace),
				AuditResource {
					kind: "ratelimit_override".into(),
					id: item.id.to_string(),
					name: Some(item.identifier.clone()),
					meta: serde_json::json!({
						"limit": item.limit,
						"duration_ms": item.duration_ms,
					}),
				},
			],
			time,
		}
	}
}

fn namespace_resource(namespace: &Namespace) -> AuditResource {
	AuditResource {
		kind: "ratelimit_namespace".into(),
		id: namespace.id.to_string(),
		name: Some(namespace.name.clone()),
		meta: serde_json::json!({ "workspace_id": namespace.workspace_id }),
	}
}
