//! Pipeline-level error types shared across the limiter, caches, and transports.

// self
use crate::_prelude::*;

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared, cloneable error source so one in-flight failure can be handed to every awaiter.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Every variant is cheap to clone because single-flight fetches hand the very same failure to
/// all concurrent callers of a key.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The authentication collaborator could not produce a crumb.
	#[error("Authentication failed: {reason}.")]
	Authentication {
		/// Collaborator- or pipeline-supplied reason string.
		reason: String,
		/// Underlying failure, when available.
		#[source]
		source: Option<SharedError>,
	},
	/// Upstream kept rejecting the attached crumb after one refresh and retry.
	#[error("Upstream rejected the credential: {message}.")]
	CredentialRejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Upstream message summarizing the rejection.
		message: String,
	},
	/// Upstream reports no data for the request.
	#[error("No data found for `{key}`.")]
	NotFound {
		/// Human-readable request identifier.
		key: String,
	},
	/// Upstream was reachable but answered with an application-level error.
	#[error("Upstream service error: {message}.")]
	ExternalService {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Upstream- or pipeline-supplied message.
		message: String,
	},
	/// Upstream answered but the payload could not be interpreted.
	#[error("Response could not be parsed at `{path}`: {message}.")]
	Parsing {
		/// JSON path of the offending value (`.` for the document root).
		path: String,
		/// Parser message.
		message: String,
	},
	/// The shared in-flight task was torn down before it produced a result.
	#[error("In-flight request was cancelled before completion.")]
	Cancelled,
}
impl Error {
	/// Builds an [`Error::Authentication`] without an underlying source.
	pub fn authentication(reason: impl Into<String>) -> Self {
		Self::Authentication { reason: reason.into(), source: None }
	}

	/// Builds an [`Error::Authentication`] wrapping the collaborator failure.
	pub fn authentication_with(
		reason: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Authentication { reason: reason.into(), source: Some(Arc::new(src)) }
	}

	/// Builds an [`Error::ExternalService`].
	pub fn external(status: Option<u16>, message: impl Into<String>) -> Self {
		Self::ExternalService { status, message: message.into() }
	}

	/// Returns the coarse category callers branch on.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Config(_) => ErrorKind::Config,
			Self::Authentication { .. } | Self::CredentialRejected { .. } =>
				ErrorKind::Authentication,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Transport(_) | Self::ExternalService { .. } | Self::Cancelled =>
				ErrorKind::ExternalService,
			Self::Parsing { .. } => ErrorKind::Parsing,
		}
	}

	/// Returns `true` when an application-level retry may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) | Self::Authentication { .. } | Self::Cancelled => true,
			Self::ExternalService { status, .. } =>
				matches!(status, Some(429) | None) || status.is_some_and(|code| code >= 500),
			Self::Config(_)
			| Self::CredentialRejected { .. }
			| Self::NotFound { .. }
			| Self::Parsing { .. } => false,
		}
	}
}

/// Coarse error categories returned by [`Error::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Invalid local configuration.
	Config,
	/// The crumb could not be obtained, or upstream rejected it again after a refresh.
	///
	/// Match on [`Error::CredentialRejected`] to tell the two apart.
	Authentication,
	/// Upstream has no data for the request.
	NotFound,
	/// Upstream (or the path to it) failed.
	ExternalService,
	/// Upstream answered with an unreadable payload.
	Parsing,
}

/// Configuration and validation failures.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Builder failure message.
		message: String,
	},
	/// Endpoint URL cannot be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Token bucket capacity must be at least one token.
	#[error("Rate limiter capacity must be at least 1.")]
	ZeroCapacity,
	/// Refill rate must be a positive, finite number.
	#[error("Rate limiter refill rate must be positive and finite, got {rate}.")]
	InvalidRefillRate {
		/// Offending rate.
		rate: f64,
	},
	/// Credential validity window must be non-zero.
	#[error("Credential validity window must be non-zero.")]
	ZeroValidityWindow,
	/// Response cache must be able to hold at least one entry.
	#[error("Response cache must hold at least one entry.")]
	ZeroCacheCapacity,
	/// Pipeline builder is missing a collaborator.
	#[error("Pipeline builder is missing the {component}.")]
	MissingComponent {
		/// Missing collaborator label.
		component: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl Display) -> Self {
		Self::HttpClientBuild { message: src.to_string() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// The transport gave up waiting for upstream.
	#[error("Request timed out.")]
	Timeout,
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling upstream.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
