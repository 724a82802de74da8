//! Shared in-flight futures backing the credential and response caches.
//!
//! The work is spawned onto the runtime so it runs to completion even when every awaiter is
//! dropped; callers only hold cloneable [`Shared`] handles to its eventual result. Owners
//! register the handle somewhere shared and arm a [`ClearOnExit`] inside the work, so the
//! registration is released even when the work panics or the task is aborted.

// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::_prelude::*;

/// Cloneable handle to a spawned fetch; every clone resolves to the same outcome.
pub(crate) type InFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Spawns `work` and returns the handle all concurrent callers await.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn<T, Fut>(work: Fut) -> InFlight<T>
where
	T: 'static + Clone + Send + Sync,
	Fut: 'static + Send + Future<Output = Result<T>>,
{
	let task = tokio::spawn(work);

	async move { task.await.unwrap_or_else(|_| Err(Error::Cancelled)) }.boxed().shared()
}

/// Runs its cleanup when dropped unless [`disarm`](Self::disarm)ed first.
///
/// Moved into spawned work so a panic unwinding out of the fetch, or a runtime tearing the
/// task down, still clears the owner's in-flight marker. The normal completion path disarms
/// it and clears the marker itself, in the same critical section that stores the result.
pub(crate) struct ClearOnExit<F>
where
	F: FnOnce(),
{
	cleanup: Option<F>,
}
impl<F> ClearOnExit<F>
where
	F: FnOnce(),
{
	pub(crate) fn new(cleanup: F) -> Self {
		Self { cleanup: Some(cleanup) }
	}

	pub(crate) fn disarm(mut self) {
		self.cleanup = None;
	}
}
impl<F> Drop for ClearOnExit<F>
where
	F: FnOnce(),
{
	fn drop(&mut self) {
		if let Some(cleanup) = self.cleanup.take() {
			cleanup();
		}
	}
}
