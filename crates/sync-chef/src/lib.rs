//! Chef server abstraction for cookbook-sync
//!
//! Typed collaborator interface over the cookbook/role publish API,
//! implemented by shelling out to `knife`.

pub mod client;
pub mod error;
pub mod knife;

pub use client::ServerClient;
pub use error::{Error, Result};
pub use knife::KnifeClient;
