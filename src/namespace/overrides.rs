//! Per-identifier limit overrides and their resolution order.

// self
use crate::{
	_prelude::*,
	auth::OverrideId,
	namespace::matcher::{self, PatternError},
};

/// Tenant-set exception to the limit/duration a caller declares for an identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
	/// Stable identifier; preserved across upserts.
	pub id: OverrideId,
	/// Exact identifier or `*` pattern.
	pub identifier: String,
	/// Requests allowed per window.
	pub limit: u64,
	/// Window length in milliseconds.
	pub duration_ms: u64,
}
impl Override {
	/// Creates an override with a freshly generated ID.
	pub fn new(identifier: impl Into<String>, limit: u64, duration_ms: u64) -> Self {
		Self { id: OverrideId::generate(), identifier: identifier.into(), limit, duration_ms }
	}

	/// Returns true if the identifier is a wildcard pattern.
	pub fn is_wildcard(&self) -> bool {
		matcher::is_wildcard(&self.identifier)
	}
}

/// Overrides of one namespace, split into exact and wildcard entries.
///
/// Exact entries are keyed by identifier. Wildcard entries keep their storage order and the first
/// matching pattern wins; no attempt is made to pick the most specific one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSet {
	direct: HashMap<String, Override>,
	wildcard: Vec<Override>,
}
impl OverrideSet {
	/// Builds a set from overrides listed in storage order.
	pub fn from_overrides<I>(overrides: I) -> Self
	where
		I: IntoIterator<Item = Override>,
	{
		let mut set = Self::default();

		for item in overrides {
			set.insert(item);
		}

		set
	}

	/// Finds the override that applies to `identifier`.
	///
	/// An exact entry always wins. Otherwise wildcard patterns are tried in storage order and the
	/// first match is returned. A malformed stored pattern aborts resolution with an error.
	pub fn resolve(&self, identifier: &str) -> Result<Option<&Override>, PatternError> {
		if let Some(exact) = self.direct.get(identifier) {
			return Ok(Some(exact));
		}

		for candidate in &self.wildcard {
			if matcher::matches(identifier, &candidate.identifier)? {
				return Ok(Some(candidate));
			}
		}

		Ok(None)
	}

	/// Returns the override stored under exactly this identifier or pattern.
	pub fn get(&self, identifier: &str) -> Option<&Override> {
		self.direct
			.get(identifier)
			.or_else(|| self.wildcard.iter().find(|item| item.identifier == identifier))
	}

	/// Inserts or updates the override for `identifier`, re-using the existing ID when present.
	///
	/// Updated wildcard entries keep their position so first-match order is stable.
	pub fn upsert(&mut self, identifier: &str, limit: u64, duration_ms: u64) -> Override {
		if let Some(existing) = self.get_mut(identifier) {
			existing.limit = limit;
			existing.duration_ms = duration_ms;

			return existing.clone();
		}

		let created = Override::new(identifier, limit, duration_ms);

		self.insert(created.clone());

		created
	}

	/// Removes the override stored under exactly this identifier or pattern.
	pub fn remove(&mut self, identifier: &str) -> Option<Override> {
		if let Some(exact) = self.direct.remove(identifier) {
			return Some(exact);
		}

		let idx = self.wildcard.iter().position(|item| item.identifier == identifier)?;

		Some(self.wildcard.remove(idx))
	}

	/// Number of overrides across both kinds.
	pub fn len(&self) -> usize {
		self.direct.len() + self.wildcard.len()
	}

	/// Returns true if no overrides are defined.
	pub fn is_empty(&self) -> bool {
		self.direct.is_empty() && self.wildcard.is_empty()
	}

	/// Wildcard overrides in storage order.
	pub fn wildcards(&self) -> &[Override] {
		&self.wildcard
	}

	/// Iterator over every override; exact entries first, in no particular order.
	pub fn iter(&self) -> impl Iterator<Item = &Override> {
		self.direct.values().chain(self.wildcard.iter())
	}

	fn insert(&mut self, item: Override) {
		if item.is_wildcard() {
			self.wildcard.push(item);
		} else {
			self.direct.insert(item.identifier.clone(), item);
		}
	}

	fn get_mut(&mut self, identifier: &str) -> Option<&mut Override> {
		if let Some(exact) = self.direct.get_mut(identifier) {
			return Some(exact);
		}

		self.wildcard.iter_mut().find(|item| item.identifier == identifier)
	}
}
