//! Durable store contracts
//!
//! The session core consumes two stores: credentials (principals and their
//! token versions) and the role graph. Both are traits so the service can
//! run against MongoDB in production and an in-memory map in dev mode and
//! tests.

mod memory;
mod model;
pub mod seed;

use std::future::Future;
use std::time::Duration;

pub use memory::MemoryStore;
pub use model::{
    normalize_email, Gender, MaritalStatus, Permission, PermissionGrant, PersonalData, Principal,
    PrincipalView, Role, RoleAssignment,
};

/// Failure reported by a store backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store operation timed out: {0}")]
    Timeout(&'static str),

    #[error("uniqueness conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Principal records keyed by id with a unique email index
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Principal>>;

    async fn list(&self) -> StoreResult<Vec<Principal>>;

    /// Insert or replace a principal. Fails with `Conflict` if another
    /// principal already holds the email.
    async fn save(&self, principal: &Principal) -> StoreResult<()>;

    /// Atomically increment the token version.
    ///
    /// With `expected = Some(v)` the increment only happens if the current
    /// version is still `v` (compare-and-increment). Returns the new version,
    /// or `None` when the principal is unknown or the comparison failed.
    async fn advance_token_version(
        &self,
        id: &str,
        expected: Option<u64>,
    ) -> StoreResult<Option<u64>>;
}

/// Read side of the principal → role → permission graph
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Assignments for one principal, in assignment order
    async fn role_assignments_for(&self, principal_id: &str) -> StoreResult<Vec<RoleAssignment>>;

    async fn grants_for_roles(&self, role_ids: &[String]) -> StoreResult<Vec<PermissionGrant>>;

    async fn roles_by_id(&self, ids: &[String]) -> StoreResult<Vec<Role>>;

    async fn permissions_by_id(&self, ids: &[String]) -> StoreResult<Vec<Permission>>;
}

/// Run a store call with an upper bound on its duration.
///
/// A hung backend turns into `StoreError::Timeout` instead of stalling the
/// caller.
pub async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(op)),
    }
}
