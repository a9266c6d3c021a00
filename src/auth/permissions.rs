//! Role-based permission resolution
//!
//! Permissions never attach to principals directly. A principal's effective
//! set is the de-duplicated union of the grants on every active role it is
//! assigned, resolved in two batched hops: assignments, then grants.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::store::{bounded, Permission, Role, RoleStore};
use crate::types::WicketError;

/// Computes roles and effective permissions for principals
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn RoleStore>,
    timeout: Duration,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn RoleStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Ids of the roles assigned to a principal, in assignment order, without repeats
    async fn assigned_role_ids(&self, principal_id: &str) -> Result<Vec<String>, WicketError> {
        let assignments = bounded(
            self.timeout,
            "role_assignments_for",
            self.store.role_assignments_for(principal_id),
        )
        .await?;

        let mut seen = HashSet::new();
        Ok(assignments
            .into_iter()
            .map(|a| a.role_id)
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }

    /// Active roles assigned to a principal
    pub async fn get_roles(&self, principal_id: &str) -> Result<Vec<Role>, WicketError> {
        let role_ids = self.assigned_role_ids(principal_id).await?;
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let roles = bounded(self.timeout, "roles_by_id", self.store.roles_by_id(&role_ids)).await?;
        Ok(roles.into_iter().filter(|r| r.is_active).collect())
    }

    /// Id of the first assigned active role, snapshotted into access tokens
    pub async fn primary_role_id(&self, principal_id: &str) -> Result<Option<String>, WicketError> {
        Ok(self
            .get_roles(principal_id)
            .await?
            .into_iter()
            .next()
            .map(|r| r.id))
    }

    /// Effective permissions of a principal, each at most once
    pub async fn get_permissions(&self, principal_id: &str) -> Result<Vec<Permission>, WicketError> {
        let roles = self.get_roles(principal_id).await?;
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<String> = roles.into_iter().map(|r| r.id).collect();
        let grants = bounded(
            self.timeout,
            "grants_for_roles",
            self.store.grants_for_roles(&role_ids),
        )
        .await?;

        let mut seen = HashSet::new();
        let permission_ids: Vec<String> = grants
            .into_iter()
            .map(|g| g.permission_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut permissions = bounded(
            self.timeout,
            "permissions_by_id",
            self.store.permissions_by_id(&permission_ids),
        )
        .await?;

        let mut unique = HashSet::new();
        permissions.retain(|p| unique.insert(p.id.clone()));

        debug!(
            principal = %principal_id,
            count = permissions.len(),
            "Resolved permissions"
        );
        Ok(permissions)
    }

    /// Slugs of the effective permissions
    pub async fn permission_slugs(&self, principal_id: &str) -> Result<BTreeSet<String>, WicketError> {
        Ok(self
            .get_permissions(principal_id)
            .await?
            .into_iter()
            .map(|p| p.slug)
            .collect())
    }

    /// Exact slug membership; no wildcards, no slug hierarchy
    pub async fn has_permission(&self, principal_id: &str, slug: &str) -> Result<bool, WicketError> {
        Ok(self
            .get_permissions(principal_id)
            .await?
            .iter()
            .any(|p| p.slug == slug))
    }

    /// Fail with `PermissionDenied` unless the principal holds `slug`
    pub async fn require(&self, principal_id: &str, slug: &str) -> Result<(), WicketError> {
        if self.has_permission(principal_id, slug).await? {
            Ok(())
        } else {
            debug!(principal = %principal_id, required = %slug, "Permission denied");
            Err(WicketError::PermissionDenied)
        }
    }
}
