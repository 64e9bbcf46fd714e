//! Broker-level error types shared across flows, caches, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
///
/// Errors are cheap to clone so one in-flight result can be handed to every caller that joined
/// it.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Limiter backend failure.
	#[error(transparent)]
	Limiter(#[from] crate::limiter::LimiterError),
	/// A stored override pattern could not be evaluated.
	#[error(transparent)]
	Pattern(#[from] crate::namespace::PatternError),
	/// The request was malformed and rejected before any work began.
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// The requested namespace or override does not exist.
	#[error("{what} `{key}` was not found.")]
	NotFound {
		/// Kind of object that was looked up.
		what: &'static str,
		/// Name or identifier used for the lookup.
		key: String,
	},
	/// The namespace exists but has been soft-deleted.
	#[error("Namespace `{namespace}` has been deleted.")]
	Gone {
		/// Name the caller used to address the namespace.
		namespace: String,
	},
	/// The caller lacks a required permission.
	#[error("Missing permission: {reason}.")]
	Unauthorized {
		/// Rendered permission query that failed.
		reason: String,
	},
}
impl Error {
	/// Classifies the error for callers that need to tell client faults from broker faults.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Validation(_) => ErrorKind::Validation,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Gone { .. } => ErrorKind::Gone,
			Self::Unauthorized { .. } => ErrorKind::Unauthorized,
			Self::Storage(_) | Self::Limiter(_) | Self::Pattern(_) => ErrorKind::Internal,
		}
	}

	/// Message that is safe to hand back to the caller.
	///
	/// Internal failures collapse into an opaque string; `Display` keeps the full detail for logs.
	pub fn public_message(&self) -> String {
		match self.kind() {
			ErrorKind::Internal => "An internal error occurred; please retry later.".into(),
			_ => self.to_string(),
		}
	}

	pub(crate) fn namespace_not_found(key: impl Into<String>) -> Self {
		Self::NotFound { what: "Namespace", key: key.into() }
	}
}

/// Coarse error classes surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Malformed request.
	Validation,
	/// Namespace or override absent.
	NotFound,
	/// Namespace soft-deleted.
	Gone,
	/// Permission missing.
	Unauthorized,
	/// Datastore, limiter, or decode failure on the broker side.
	Internal,
}

/// Request validation failures raised before any resolution work starts.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Namespace name was empty.
	#[error("Namespace name cannot be empty.")]
	EmptyNamespace,
	/// Namespace name exceeded the allowed byte length.
	#[error("Namespace name exceeds {max} bytes.")]
	NamespaceTooLong {
		/// Maximum permitted byte length.
		max: usize,
	},
	/// Identifier was empty.
	#[error("Identifier cannot be empty.")]
	EmptyIdentifier,
	/// Identifier exceeded the allowed byte length.
	#[error("Identifier exceeds {max} bytes.")]
	IdentifierTooLong {
		/// Maximum permitted byte length.
		max: usize,
	},
	/// Limit was negative.
	#[error("Limit must not be negative; got {0}.")]
	NegativeLimit(i64),
	/// Duration was zero or negative.
	#[error("Duration must be positive; got {0}ms.")]
	NonPositiveDuration(i64),
	/// Cost was negative.
	#[error("Cost must not be negative; got {0}.")]
	NegativeCost(i64),
	/// Batch request carried no checks.
	#[error("At least one rate limit check is required.")]
	EmptyBatch,
}

/// Failures raised while loading a [`crate::config::BrokerConfig`].
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration payload could not be parsed.
	#[error("Configuration is invalid at `{path}`.")]
	Parse {
		/// Dotted path of the offending field.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A field parsed but holds an unusable value.
	#[error("Configuration field `{field}` is invalid: {reason}.")]
	InvalidValue {
		/// Field name.
		field: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(source: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Parse { path: source.path().to_string(), source }
	}
}
