//! Subversion abstraction for cookbook-sync
//!
//! Exposes a typed collaborator interface over the working copy so the
//! change-set engine never parses version-control output itself.

pub mod client;
pub mod error;
pub mod svn;

pub use client::{ChangeKind, DiffEntry, Revision, VcsClient};
pub use error::{Error, Result};
pub use svn::SvnClient;
