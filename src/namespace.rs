//! Rate-limit namespaces and the overrides loaded with them.

pub mod matcher;
pub mod overrides;

pub use matcher::PatternError;
pub use overrides::{Override, OverrideSet};

// self
use crate::{
	_prelude::*,
	auth::{NamespaceId, WorkspaceId},
	error::ValidationError,
};

/// Maximum byte length of a namespace name.
pub const NAME_MAX_LEN: usize = 255;

/// Tenant-scoped group of rate-limit buckets, addressable by name or ID.
///
/// The namespace is the unit of caching: overrides always travel with it and are never resolved
/// on their own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
	/// Generated identifier.
	pub id: NamespaceId,
	/// Owning workspace.
	pub workspace_id: WorkspaceId,
	/// Name, unique within the workspace; any characters are allowed.
	pub name: String,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Last modification instant, if any.
	pub updated_at: Option<OffsetDateTime>,
	/// Soft-delete marker.
	pub deleted_at: Option<OffsetDateTime>,
	/// Overrides defined for this namespace.
	pub overrides: OverrideSet,
}
impl Namespace {
	/// Builds a brand-new namespace row with a generated ID and no overrides.
	pub fn new(workspace_id: WorkspaceId, name: impl Into<String>, now: OffsetDateTime) -> Self {
		Self {
			id: NamespaceId::generate(),
			workspace_id,
			name: name.into(),
			created_at: now,
			updated_at: None,
			deleted_at: None,
			overrides: OverrideSet::default(),
		}
	}

	/// Returns true once the namespace has been soft-deleted.
	pub fn is_deleted(&self) -> bool {
		self.deleted_at.is_some()
	}

	/// Returns true if `key` addresses this namespace by name or by ID.
	pub fn is_addressed_by(&self, key: &str) -> bool {
		self.name == key || self.id.as_ref() == key
	}
}

/// Checks a namespace name against the length bounds; no character class is restricted.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
	if name.is_empty() {
		return Err(ValidationError::EmptyNamespace);
	}
	if name.len() > NAME_MAX_LEN {
		return Err(ValidationError::NamespaceTooLong { max: NAME_MAX_LEN });
	}

	Ok(())
}
