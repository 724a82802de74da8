//! Request-admission pipeline for crumb-gated finance APIs: token-bucket throttling plus
//! single-flight crumb refresh and TTL response caching.
//!
//! Every outbound call flows through [`pipeline::RequestPipeline`]:
//!
//! ```text
//! cache check -> admission (token bucket) -> authenticate (crumb) -> dispatch -> translate
//! ```
//!
//! The HTTP stack, endpoint URL construction, and domain-model mapping stay outside the
//! crate behind the [`transport::Transport`], [`auth::CredentialFetcher`], and
//! [`decode::ResponseDecoder`] contracts. The optional `reqwest` feature ships thin
//! implementations of the first two.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
#[cfg(feature = "reqwest")] pub mod http;
pub mod obs;
pub mod pipeline;
pub mod rate_limit;
pub mod transport;

mod singleflight;

#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		auth::{Credential, CredentialFetcher, CredentialFuture, CredentialSource},
		error::TransportError,
		transport::{RawResponse, RequestSpec, Transport, TransportFuture, TransportOutcome},
	};

	/// Scripted authentication collaborator that counts how often it is asked for a crumb.
	#[derive(Debug, Default)]
	pub struct CountingFetcher {
		calls: AtomicUsize,
		delay: Option<std::time::Duration>,
		failures: Mutex<VecDeque<Error>>,
	}
	impl CountingFetcher {
		/// Delays every fetch by `delay` so concurrent callers pile up behind it.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = Some(delay);

			self
		}

		/// Queues a failure returned by the next fetch instead of a crumb.
		pub fn fail_next(&self, error: Error) {
			self.failures.lock().push_back(error);
		}

		/// Number of fetches issued so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl CredentialFetcher for CountingFetcher {
		fn fetch_credential(&self) -> CredentialFuture<'_> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				if let Some(delay) = self.delay {
					tokio::time::sleep(delay).await;
				}
				if let Some(error) = self.failures.lock().pop_front() {
					return Err(error);
				}

				Ok(Credential::issue(format!("crumb-{call}"), CredentialSource::Primary))
			})
		}
	}

	/// Scripted transport collaborator that replays queued outcomes and records every crumb
	/// it was called with.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		outcomes: Mutex<VecDeque<Result<TransportOutcome, TransportError>>>,
		fallback: Mutex<Option<RawResponse>>,
		delay: Option<std::time::Duration>,
		crumbs: Mutex<Vec<String>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that answers every call with `response` once the queue is empty.
		pub fn always(response: RawResponse) -> Self {
			Self { fallback: Mutex::new(Some(response)), ..Default::default() }
		}

		/// Delays every call by `delay`.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = Some(delay);

			self
		}

		/// Queues a single outcome.
		pub fn push(&self, outcome: Result<TransportOutcome, TransportError>) {
			self.outcomes.lock().push_back(outcome);
		}

		/// Crumbs attached to each call, in dispatch order.
		pub fn crumbs(&self) -> Vec<String> {
			self.crumbs.lock().clone()
		}

		/// Number of calls dispatched so far.
		pub fn calls(&self) -> usize {
			self.crumbs.lock().len()
		}
	}
	impl Transport for ScriptedTransport {
		fn call<'a>(
			&'a self,
			_spec: &'a RequestSpec,
			credential: &'a Credential,
		) -> TransportFuture<'a> {
			Box::pin(async move {
				self.crumbs.lock().push(credential.token.expose().to_owned());

				if let Some(delay) = self.delay {
					tokio::time::sleep(delay).await;
				}
				if let Some(outcome) = self.outcomes.lock().pop_front() {
					return outcome;
				}

				match self.fallback.lock().clone() {
					Some(response) => Ok(TransportOutcome::Response(response)),
					None => Err(TransportError::Timeout),
				}
			})
		}
	}

	/// Builds a JSON response with status 200.
	pub fn json_ok(body: &str) -> RawResponse {
		RawResponse::new(200, body)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
