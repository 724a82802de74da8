//! Authentication collaborator contract.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialSource},
};

/// Boxed future returned by [`CredentialFetcher::fetch_credential`].
pub type CredentialFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Obtains a fresh crumb from upstream.
///
/// Only [`CredentialCache`](crate::auth::CredentialCache) calls this, and never more than once
/// per concurrent refresh. Implementations should not retry internally.
pub trait CredentialFetcher
where
	Self: Send + Sync,
{
	/// Performs one authentication round trip.
	fn fetch_credential(&self) -> CredentialFuture<'_>;
}

/// Fetcher that hands out a caller-supplied crumb.
#[derive(Clone, Debug)]
pub struct StaticCredentialFetcher {
	crumb: String,
}
impl StaticCredentialFetcher {
	/// Wraps the crumb every fetch will return.
	pub fn new(crumb: impl Into<String>) -> Self {
		Self { crumb: crumb.into() }
	}
}
impl CredentialFetcher for StaticCredentialFetcher {
	fn fetch_credential(&self) -> CredentialFuture<'_> {
		Box::pin(async move {
			if self.crumb.trim().is_empty() {
				return Err(Error::authentication("static crumb is empty"));
			}

			Ok(Credential::issue(self.crumb.clone(), CredentialSource::Static))
		})
	}
}
