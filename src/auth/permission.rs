//! Permission tuples, boolean permission queries, and the authorization contract.
//!
//! The broker only builds queries; deciding whether a caller satisfies one is delegated to an
//! [`Authorizer`]. [`GrantSet`] is a minimal evaluator over a flat list of held permissions.

// self
use crate::_prelude::*;

/// Boxed future returned by [`Authorizer::verify`].
pub type AuthorizeFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Verifies permission queries for the caller a request was authenticated as.
pub trait Authorizer
where
	Self: Send + Sync,
{
	/// Resolves to `Ok(())` when the caller satisfies `query`, or [`Error::Unauthorized`].
	fn verify<'a>(&'a self, query: &'a PermissionQuery) -> AuthorizeFuture<'a>;
}

/// Actions guarded on rate-limit namespaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
	/// Run a rate-limit check.
	Limit,
	/// Auto-create a namespace on first use.
	CreateNamespace,
	/// Create or update an override.
	SetOverride,
	/// Delete an override.
	DeleteOverride,
}
impl Action {
	/// Returns the stable label used in permission strings.
	pub const fn as_str(self) -> &'static str {
		match self {
			Action::Limit => "limit",
			Action::CreateNamespace => "create_namespace",
			Action::SetOverride => "set_override",
			Action::DeleteOverride => "delete_override",
		}
	}
}

/// Single `ratelimit.<resource>.<action>` permission tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
	/// Namespace ID, or `*` for the blanket grant.
	pub resource_id: String,
	/// Guarded action.
	pub action: Action,
}
impl Permission {
	const RESOURCE_TYPE: &'static str = "ratelimit";
	const ANY: &'static str = "*";

	/// Permission scoped to one namespace.
	pub fn on(resource_id: impl Into<String>, action: Action) -> Self {
		Self { resource_id: resource_id.into(), action }
	}

	/// Blanket permission covering every namespace in the workspace.
	pub fn any(action: Action) -> Self {
		Self::on(Self::ANY, action)
	}
}
impl Display for Permission {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}.{}.{}", Self::RESOURCE_TYPE, self.resource_id, self.action.as_str())
	}
}

/// Boolean combination of permission tuples.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionQuery {
	/// Leaf permission.
	Permission(Permission),
	/// Every child must hold.
	And(Vec<PermissionQuery>),
	/// At least one child must hold.
	Or(Vec<PermissionQuery>),
}
impl PermissionQuery {
	/// `(namespace-specific OR wildcard)` for a single action.
	pub fn specific_or_any(resource_id: impl Into<String>, action: Action) -> Self {
		Self::Or(vec![
			Self::Permission(Permission::on(resource_id, action)),
			Self::Permission(Permission::any(action)),
		])
	}

	/// `wildcard OR (AND of every specific)` used for batch checks.
	///
	/// Duplicate resource IDs collapse into one leaf while preserving first-seen order.
	pub fn any_or_all<I, S>(resource_ids: I, action: Action) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut seen = HashSet::new();
		let specific = resource_ids
			.into_iter()
			.map(Into::into)
			.filter(|id: &String| seen.insert(id.clone()))
			.map(|id| Self::Permission(Permission::on(id, action)))
			.collect();

		Self::Or(vec![Self::Permission(Permission::any(action)), Self::And(specific)])
	}

	/// Evaluates the query against a predicate over leaf permissions.
	///
	/// An empty `And` holds and an empty `Or` does not.
	pub fn evaluate(&self, holds: &dyn Fn(&Permission) -> bool) -> bool {
		match self {
			Self::Permission(permission) => holds(permission),
			Self::And(children) => children.iter().all(|child| child.evaluate(holds)),
			Self::Or(children) => children.iter().any(|child| child.evaluate(holds)),
		}
	}
}
impl From<Permission> for PermissionQuery {
	fn from(value: Permission) -> Self {
		Self::Permission(value)
	}
}
impl Display for PermissionQuery {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let (children, joiner) = match self {
			Self::Permission(permission) => return Display::fmt(permission, f),
			Self::And(children) => (children, " AND "),
			Self::Or(children) => (children, " OR "),
		};

		f.write_str("(")?;

		for (idx, child) in children.iter().enumerate() {
			if idx > 0 {
				f.write_str(joiner)?;
			}

			Display::fmt(child, f)?;
		}

		f.write_str(")")
	}
}

/// Flat set of permission strings held by a caller.
#[derive(Clone, Debug, Default)]
pub struct GrantSet(HashSet<String>);
impl GrantSet {
	/// Creates a set from rendered permission strings such as `ratelimit.*.limit`.
	pub fn new<I, S>(grants: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(grants.into_iter().map(Into::into).collect())
	}

	/// Returns true if the leaf permission is held verbatim.
	pub fn holds(&self, permission: &Permission) -> bool {
		self.0.contains(&permission.to_string())
	}
}
impl Authorizer for GrantSet {
	fn verify<'a>(&'a self, query: &'a PermissionQuery) -> AuthorizeFuture<'a> {
		Box::pin(async move {
			if query.evaluate(&|permission| self.holds(permission)) {
				Ok(())
			} else {
				Err(Error::Unauthorized { reason: query.to_string() })
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn permissions_render_as_dotted_tuples() {
		assert_eq!(Permission::on("ns_1", Action::Limit).to_string(), "ratelimit.ns_1.limit");
		assert_eq!(
			Permission::any(Action::CreateNamespace).to_string(),
			"ratelimit.*.create_namespace"
		);
	}

	#[test]
	fn batch_query_requires_wildcard_or_every_specific() {
		let query = PermissionQuery::any_or_all(["ns_a", "ns_b", "ns_a"], Action::Limit);

		assert_eq!(
			query.to_string(),
			"(ratelimit.*.limit OR (ratelimit.ns_a.limit AND ratelimit.ns_b.limit))"
		);

		let only_a = GrantSet::new(["ratelimit.ns_a.limit"]);
		let both = GrantSet::new(["ratelimit.ns_a.limit", "ratelimit.ns_b.limit"]);
		let wildcard = GrantSet::new(["ratelimit.*.limit"]);

		assert!(!query.evaluate(&|p| only_a.holds(p)));
		assert!(query.evaluate(&|p| both.holds(p)));
		assert!(query.evaluate(&|p| wildcard.holds(p)));
	}

	#[tokio::test]
	async fn grant_set_reports_failed_query() {
		let grants = GrantSet::new(["ratelimit.ns_other.limit"]);
		let query = PermissionQuery::specific_or_any("ns_1", Action::Limit);
		let err = grants.verify(&query).await.expect_err("Unrelated grant must not satisfy query.");

		assert!(matches!(err, Error::Unauthorized { ref reason } if reason.contains("ns_1")));
		assert!(GrantSet::new(["ratelimit.ns_1.limit"]).verify(&query).await.is_ok());
	}
}
