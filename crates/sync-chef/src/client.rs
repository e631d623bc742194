//! Collaborator trait for cookbook and role publishing

use std::path::PathBuf;

use crate::Result;

/// Trait for publishing cookbooks and roles to a configuration server.
///
/// Uploads are batched; deletions are issued one call per name so each
/// failure stays individually attributable. All operations must be
/// idempotent: re-publishing an unchanged artifact is harmless.
pub trait ServerClient {
    /// Upload every cookbook present in the repository
    fn upload_all_cookbooks(&self) -> Result<()>;

    /// Upload the named cookbooks in one batched call
    fn upload_cookbooks(&self, names: &[String]) -> Result<()>;

    /// Delete a single cookbook by name
    fn delete_cookbook(&self, name: &str) -> Result<()>;

    /// Create or update roles from the given files in one batched call
    /// (paths relative to the repository root)
    fn upload_roles(&self, files: &[PathBuf]) -> Result<()>;

    /// Delete a single role by name
    fn delete_role(&self, name: &str) -> Result<()>;
}
