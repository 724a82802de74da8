//! Transport collaborator contract plus the status/body classification every transport shares.
//!
//! A [`Transport`] performs one HTTP exchange with the crumb attached and reports either the
//! raw response or that the crumb was rejected. Implementations own their timeouts; the
//! pipeline never retries a [`TransportError`].

// self
use crate::{
	_prelude::*,
	auth::Credential,
	cache::CacheKey,
	error::TransportError,
};

/// Boxed future returned by [`Transport::call`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportOutcome, TransportError>> + 'a + Send>>;

/// Executes prepared upstream calls.
pub trait Transport
where
	Self: Send + Sync,
{
	/// Dispatches `spec` with `credential` attached.
	///
	/// Implementations must report a rejected crumb as [`TransportOutcome::CredentialRejected`]
	/// rather than as a response so the pipeline can apply its one-shot retry;
	/// [`classify_response`] implements the standard detection.
	fn call<'a>(&'a self, spec: &'a RequestSpec, credential: &'a Credential)
	-> TransportFuture<'a>;
}

/// What a transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportOutcome {
	/// Upstream answered; status may still be an error.
	Response(RawResponse),
	/// Upstream declined the attached crumb.
	CredentialRejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Upstream message summarizing the rejection.
		message: String,
	},
}

/// Status and body of an upstream response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body decoded as text.
	pub body: String,
}
impl RawResponse {
	/// Creates a response from its parts.
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self { status, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub const fn is_success(&self) -> bool {
		self.status >= 200 && self.status < 300
	}
}

/// Prepared upstream call.
///
/// `endpoint` names the logical operation (used for cache keys and TTL lookups); `url` and
/// `query` describe the HTTP request. The crumb is appended as the `crumb_param` query
/// parameter by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
	/// Logical endpoint name, e.g. `quoteSummary`.
	pub endpoint: String,
	/// Absolute URL without the query string.
	pub url: Url,
	/// Query parameters, sorted by name.
	pub query: BTreeMap<String, String>,
	/// Extra request headers.
	pub headers: BTreeMap<String, String>,
	/// Per-request timeout override for the transport.
	pub timeout: Option<Duration>,
	/// Query parameter name carrying the crumb.
	pub crumb_param: String,
}
impl RequestSpec {
	const DEFAULT_CRUMB_PARAM: &'static str = "crumb";

	/// Creates a GET request for `endpoint` at `url`.
	pub fn get(endpoint: impl Into<String>, url: Url) -> Self {
		Self {
			endpoint: endpoint.into(),
			url,
			query: BTreeMap::new(),
			headers: BTreeMap::new(),
			timeout: None,
			crumb_param: Self::DEFAULT_CRUMB_PARAM.into(),
		}
	}

	/// Adds or replaces a query parameter.
	pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.insert(name.into(), value.into());

		self
	}

	/// Adds or replaces a header; names are lowercased.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Overrides the transport timeout for this request.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Renames the crumb query parameter.
	pub fn with_crumb_param(mut self, name: impl Into<String>) -> Self {
		self.crumb_param = name.into();

		self
	}

	/// Cache key derived from the endpoint, the URL path, and normalized query parameters.
	///
	/// The host is left out so mirrors serving the same path share entries.
	pub fn cache_key(&self) -> CacheKey {
		let key = CacheKey::new(self.endpoint.clone()).with_path(self.url.path());

		self.query.iter().fold(key, |key, (name, value)| key.with_param(name, value))
	}

	/// Full URL including the query parameters and `credential`.
	pub fn url_with_credential(&self, credential: &Credential) -> Url {
		let mut url = self.url.clone();

		{
			let mut pairs = url.query_pairs_mut();

			for (name, value) in &self.query {
				pairs.append_pair(name, value);
			}

			pairs.append_pair(&self.crumb_param, credential.token.expose());
		}

		url
	}
}

/// Splits crumb rejections from ordinary responses.
///
/// A 401 is a rejection, as is any other error status whose body names an invalid crumb or
/// cookie. Success bodies are never inspected.
pub fn classify_response(response: RawResponse) -> TransportOutcome {
	let rejected = match response.status {
		401 => true,
		_ if response.is_success() => false,
		_ => {
			let lowered = response.body.to_ascii_lowercase();

			lowered.contains("invalid crumb") || lowered.contains("invalid cookie")
		},
	};

	if rejected {
		TransportOutcome::CredentialRejected {
			status: Some(response.status),
			message: body_preview(&response.body),
		}
	} else {
		TransportOutcome::Response(response)
	}
}

/// Maps non-success statuses into typed errors, passing 2xx responses through.
pub fn translate_status(key: &CacheKey, response: RawResponse) -> Result<RawResponse> {
	match response.status {
		_ if response.is_success() => Ok(response),
		404 => Err(Error::NotFound { key: key.to_string() }),
		status => Err(Error::ExternalService {
			status: Some(status),
			message: if response.body.trim().is_empty() {
				format!("upstream returned status {status}")
			} else {
				body_preview(&response.body)
			},
		}),
	}
}

const BODY_PREVIEW_LIMIT: usize = 256;

pub(crate) fn body_preview(body: &str) -> String {
	let body = body.trim();

	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body.to_owned();
	}

	let mut buf = body.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::CredentialSource;

	fn spec() -> RequestSpec {
		RequestSpec::get(
			"quoteSummary",
			Url::parse("https://query2.example.test/v10/finance/quoteSummary/AAPL")
				.expect("Fixture URL should parse."),
		)
		.with_query("modules", "price,assetProfile")
	}

	#[test]
	fn credential_is_appended_as_query_parameter() {
		let credential = Credential::issue("a/b=c", CredentialSource::Primary);
		let url = spec().url_with_credential(&credential);

		assert_eq!(
			url.as_str(),
			"https://query2.example.test/v10/finance/quoteSummary/AAPL?modules=price%2CassetProfile&crumb=a%2Fb%3Dc",
		);
	}

	#[test]
	fn cache_key_ignores_module_order() {
		let reordered = spec().with_query("modules", "assetProfile,price");

		assert_eq!(spec().cache_key(), reordered.cache_key());
		assert_eq!(spec().cache_key().endpoint(), "quoteSummary");
	}

	#[test]
	fn cache_key_distinguishes_symbols_in_the_path() {
		let msft = RequestSpec::get(
			"quoteSummary",
			Url::parse("https://query1.example.test/v10/finance/quoteSummary/MSFT")
				.expect("Fixture URL should parse."),
		)
		.with_query("modules", "price,assetProfile");
		let mirror = RequestSpec::get(
			"quoteSummary",
			Url::parse("https://query1.example.test/v10/finance/quoteSummary/AAPL")
				.expect("Fixture URL should parse."),
		)
		.with_query("modules", "price,assetProfile");

		assert_ne!(spec().cache_key(), msft.cache_key());
		assert_eq!(spec().cache_key(), mirror.cache_key());
		assert_eq!(msft.cache_key().path(), Some("/v10/finance/quoteSummary/MSFT"));
	}

	#[test]
	fn rejections_are_detected_by_status_and_body() {
		assert!(matches!(
			classify_response(RawResponse::new(401, "Unauthorized")),
			TransportOutcome::CredentialRejected { status: Some(401), .. }
		));
		assert!(matches!(
			classify_response(RawResponse::new(
				400,
				r#"{"finance":{"result":null,"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#,
			)),
			TransportOutcome::CredentialRejected { status: Some(400), .. }
		));
		assert!(matches!(
			classify_response(RawResponse::new(500, "boom")),
			TransportOutcome::Response(_)
		));
	}

	#[test]
	fn success_bodies_mentioning_crumbs_are_responses() {
		let article = r#"{"news":[{"title":"Why an invalid cookie broke checkout"}]}"#;

		assert!(matches!(
			classify_response(RawResponse::new(200, article)),
			TransportOutcome::Response(RawResponse { status: 200, .. })
		));
	}

	#[test]
	fn statuses_translate_into_categories() {
		let key = CacheKey::from("AAPL:price");

		assert!(translate_status(&key, RawResponse::new(204, "")).is_ok());
		assert!(matches!(
			translate_status(&key, RawResponse::new(404, "")),
			Err(Error::NotFound { key }) if key == "AAPL:price"
		));
		assert!(matches!(
			translate_status(&key, RawResponse::new(503, "")),
			Err(Error::ExternalService { status: Some(503), message })
				if message == "upstream returned status 503"
		));
	}

	#[test]
	fn previews_are_truncated() {
		let preview = body_preview(&"x".repeat(1_000));

		assert_eq!(preview.chars().count(), BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
