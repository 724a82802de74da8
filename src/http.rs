//! reqwest-backed [`Transport`] and [`CredentialFetcher`] implementations.
//!
//! Both share one [`ReqwestClient`] with a cookie store: the crumb is only honored together
//! with the session cookie set while it was fetched, so build the fetcher with
//! [`ReqwestCrumbFetcher::sharing`] to keep them on the same jar.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialFetcher, CredentialFuture, CredentialSource},
	error::{ConfigError, TransportError},
	transport::{self, RawResponse, RequestSpec, Transport, TransportFuture},
};

/// Browser-like user agent; crumb endpoints refuse obvious bot agents.
pub const DEFAULT_USER_AGENT: &str =
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const MAX_CRUMB_LEN: usize = 100;

/// Executes [`RequestSpec`]s with reqwest and classifies crumb rejections.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	timeout: Option<Duration>,
}
impl ReqwestTransport {
	/// Builds a client with a cookie store and [`DEFAULT_USER_AGENT`].
	pub fn new() -> Result<Self, ConfigError> {
		let client =
			ReqwestClient::builder().cookie_store(true).user_agent(DEFAULT_USER_AGENT).build()?;

		Ok(Self::with_client(client))
	}

	/// Wraps an existing client; enable its cookie store for crumb-gated upstreams.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: None }
	}

	/// Default timeout applied when a [`RequestSpec`] does not set one.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Underlying client.
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}
}
impl Transport for ReqwestTransport {
	fn call<'a>(
		&'a self,
		spec: &'a RequestSpec,
		credential: &'a Credential,
	) -> TransportFuture<'a> {
		Box::pin(async move {
			let mut request = self.client.get(spec.url_with_credential(credential));

			for (name, value) in &spec.headers {
				request = request.header(name.as_str(), value.as_str());
			}
			if let Some(timeout) = spec.timeout.or(self.timeout) {
				request = request.timeout(timeout);
			}

			let response = request.send().await?;
			let status = response.status().as_u16();
			let body = response.text().await?;

			Ok(transport::classify_response(RawResponse::new(status, body)))
		})
	}
}

/// Obtains crumbs from a primary endpoint with an optional fallback.
///
/// When a cookie URL is configured it is visited first so the shared jar holds a session
/// cookie. Each crumb endpoint answer must be a 2xx, non-empty, whitespace-free token shorter
/// than 100 bytes; HTML pages are skipped, and a "too many requests" answer aborts the
/// refresh.
#[derive(Clone, Debug)]
pub struct ReqwestCrumbFetcher {
	client: ReqwestClient,
	cookie_url: Option<Url>,
	primary: Url,
	fallback: Option<Url>,
	referer: Option<String>,
	timeout: Option<Duration>,
}
impl ReqwestCrumbFetcher {
	/// Creates a fetcher for `primary` using `client`.
	pub fn new(client: ReqwestClient, primary: Url) -> Self {
		Self { client, cookie_url: None, primary, fallback: None, referer: None, timeout: None }
	}

	/// Creates a fetcher that shares `transport`'s client and cookie jar.
	pub fn sharing(transport: &ReqwestTransport, primary: Url) -> Self {
		Self::new(transport.client().clone(), primary)
	}

	/// Visits `url` before asking for a crumb so the session cookie is set.
	pub fn with_cookie_url(mut self, url: Url) -> Self {
		self.cookie_url = Some(url);

		self
	}

	/// Endpoint tried when the primary one fails.
	pub fn with_fallback(mut self, url: Url) -> Self {
		self.fallback = Some(url);

		self
	}

	/// Sends `referer` with every authentication request.
	pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
		self.referer = Some(referer.into());

		self
	}

	/// Timeout applied to every authentication request.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	async fn get(&self, url: &Url) -> Result<RawResponse, TransportError> {
		let mut request = self.client.get(url.clone());

		if let Some(referer) = &self.referer {
			request = request.header("referer", referer.as_str());
		}
		if let Some(timeout) = self.timeout {
			request = request.timeout(timeout);
		}

		let response = request.send().await?;
		let status = response.status().as_u16();
		let body = response.text().await?;

		Ok(RawResponse::new(status, body))
	}

	async fn fetch(&self) -> Result<Credential> {
		if let Some(cookie_url) = &self.cookie_url {
			// Any status will do; only the Set-Cookie header matters.
			self.get(cookie_url)
				.await
				.map_err(|e| Error::authentication_with("session cookie request failed", e))?;
		}

		let candidates = [
			(CredentialSource::Primary, Some(&self.primary)),
			(CredentialSource::Fallback, self.fallback.as_ref()),
		];
		let mut last_failure = None;

		for (source, url) in candidates {
			let Some(url) = url else { continue };

			match self.get(url).await {
				Ok(response) => match validate_crumb(&response) {
					Ok(crumb) => return Ok(Credential::issue(crumb, source)),
					Err(CrumbRejection::RateLimited) =>
						return Err(Error::authentication(
							"crumb endpoint is rate limiting requests",
						)),
					Err(CrumbRejection::Unusable(reason)) => {
						last_failure = Some(Error::authentication(format!(
							"{source} crumb endpoint returned {reason}"
						)));
					},
				},
				Err(e) => {
					last_failure =
						Some(Error::authentication_with(format!("{source} crumb request failed"), e));
				},
			}
		}

		Err(last_failure.unwrap_or_else(|| Error::authentication("no crumb endpoint configured")))
	}
}
impl CredentialFetcher for ReqwestCrumbFetcher {
	fn fetch_credential(&self) -> CredentialFuture<'_> {
		Box::pin(self.fetch())
	}
}

#[derive(Debug, PartialEq, Eq)]
enum CrumbRejection {
	RateLimited,
	Unusable(&'static str),
}

fn validate_crumb(response: &RawResponse) -> Result<String, CrumbRejection> {
	let body = response.body.trim();
	let lowered = body.to_ascii_lowercase();

	if response.status == 429 || lowered.contains("too many requests") {
		return Err(CrumbRejection::RateLimited);
	}
	if !response.is_success() {
		return Err(CrumbRejection::Unusable("a non-success status"));
	}
	if lowered.contains("<html") || lowered.contains("<!doctype") {
		return Err(CrumbRejection::Unusable("an HTML page"));
	}
	if body.is_empty() {
		return Err(CrumbRejection::Unusable("an empty body"));
	}
	if body.len() >= MAX_CRUMB_LEN || body.chars().any(char::is_whitespace) {
		return Err(CrumbRejection::Unusable("a malformed crumb"));
	}

	Ok(body.to_owned())
}
