//! Shared key-value state with per-key optimistic locks.
//!
//! A [`StateStore`] on the server holds the authoritative map. Clients open a
//! [`Session`] over a [`Connection`], keep a mirror that is refreshed by a
//! server-streaming subscription, and mutate the map through all-or-nothing
//! batches. [`SharedResource`] and [`SharedCollection`] are typed facades on
//! top of a session.

mod access_token;
mod collection;
mod config;
mod errors;
mod network;
mod resource;
mod scope;
mod session;
mod store;
mod value;

pub mod metrics;
pub mod proto;
pub mod records;
pub mod utils;

pub use access_token::*;
pub use collection::*;
pub use config::*;
pub use errors::*;
pub use network::*;
pub use resource::*;
pub use scope::Scope;
pub use scope::ScopeKind;
pub use session::*;
pub use store::*;
pub use value::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
