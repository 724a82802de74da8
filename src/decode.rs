//! Response decoding contract and the JSON decoder used by the finance endpoints.

// std
use std::marker::PhantomData;
// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{_prelude::*, cache::CacheKey, transport::RawResponse};

/// Turns a successful raw response into the caller's value type.
pub trait ResponseDecoder<V>
where
	Self: Send + Sync,
{
	/// Decodes `response`, which is known to carry a 2xx status.
	///
	/// Implementations surface upstream error payloads embedded in a 2xx body as
	/// [`Error::NotFound`] or [`Error::ExternalService`], and malformed bodies as
	/// [`Error::Parsing`].
	fn decode(&self, key: &CacheKey, response: &RawResponse) -> Result<V>;
}

/// Decodes JSON bodies into `T`, recognizing the `{"<root>":{"error":{...}}}` envelope.
pub struct JsonDecoder<T> {
	_marker: PhantomData<fn() -> T>,
}
impl<T> JsonDecoder<T> {
	/// Creates a decoder for `T`.
	pub const fn new() -> Self {
		Self { _marker: PhantomData }
	}
}
impl<T> Clone for JsonDecoder<T> {
	fn clone(&self) -> Self {
		Self::new()
	}
}
impl<T> Default for JsonDecoder<T> {
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Debug for JsonDecoder<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JsonDecoder").field("target", &std::any::type_name::<T>()).finish()
	}
}
impl<T> ResponseDecoder<T> for JsonDecoder<T>
where
	T: DeserializeOwned,
{
	fn decode(&self, key: &CacheKey, response: &RawResponse) -> Result<T> {
		let value = serde_json::from_str::<Value>(&response.body)
			.map_err(|e| Error::Parsing { path: ".".into(), message: e.to_string() })?;

		if let Some(err) = embedded_error(key, &value) {
			return Err(err);
		}

		serde_path_to_error::deserialize::<_, T>(value).map_err(|e| Error::Parsing {
			path: e.path().to_string(),
			message: e.inner().to_string(),
		})
	}
}

/// Passes the body through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextDecoder;
impl ResponseDecoder<String> for TextDecoder {
	fn decode(&self, _key: &CacheKey, response: &RawResponse) -> Result<String> {
		Ok(response.body.clone())
	}
}

#[derive(Deserialize)]
struct ErrorPayload {
	#[serde(default)]
	code: Option<String>,
	#[serde(default)]
	description: Option<String>,
}

fn embedded_error(key: &CacheKey, value: &Value) -> Option<Error> {
	let envelope = value.as_object()?;
	let present = |error: &&Value| !error.is_null();
	let error = envelope
		.get("error")
		.filter(present)
		.or_else(|| envelope.values().find_map(|inner| inner.get("error").filter(present)))?;
	let payload = serde_json::from_value::<ErrorPayload>(error.clone())
		.unwrap_or(ErrorPayload { code: None, description: error.as_str().map(str::to_owned) });
	let code = payload.code.unwrap_or_default();
	let description = payload.description.unwrap_or_default();

	if code.eq_ignore_ascii_case("not found")
		|| description.to_ascii_lowercase().contains("no data found")
	{
		return Some(Error::NotFound { key: key.to_string() });
	}

	let message = match (code.is_empty(), description.is_empty()) {
		(false, false) => format!("{code}: {description}"),
		(false, true) => code,
		(true, false) => description,
		(true, true) => "upstream reported an unspecified error".into(),
	};

	Some(Error::ExternalService { status: None, message })
}
