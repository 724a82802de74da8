//! Crumb credentials, the authentication collaborator contract, and the single-flight
//! credential cache.

pub mod cache;
pub mod credential;
pub mod fetcher;

pub use cache::*;
pub use credential::*;
pub use fetcher::*;
