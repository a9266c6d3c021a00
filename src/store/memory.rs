//! In-memory store
//!
//! Backs dev mode and the test suites. Principals live in a `DashMap`, so a
//! token-version change holds that principal's shard lock for the whole
//! read-compare-increment.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{
    normalize_email, CredentialStore, Permission, PermissionGrant, Principal, Role,
    RoleAssignment, RoleStore, StoreError, StoreResult,
};

#[derive(Default)]
pub struct MemoryStore {
    principals: DashMap<String, Principal>,
    /// email → principal id
    by_email: DashMap<String, String>,
    roles: DashMap<String, Role>,
    permissions: DashMap<String, Permission>,
    assignments: RwLock<Vec<RoleAssignment>>,
    grants: RwLock<Vec<PermissionGrant>>,
    /// Artificial delay applied to every call (simulates a slow backend)
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call first sleeps for `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn insert_role(&self, role: Role) -> StoreResult<()> {
        if self.roles.iter().any(|r| r.name == role.name && r.id != role.id) {
            return Err(StoreError::Conflict(format!("role name '{}' exists", role.name)));
        }
        self.roles.insert(role.id.clone(), role);
        Ok(())
    }

    pub fn insert_permission(&self, permission: Permission) -> StoreResult<()> {
        if self
            .permissions
            .iter()
            .any(|p| p.slug == permission.slug && p.id != permission.id)
        {
            return Err(StoreError::Conflict(format!(
                "permission slug '{}' exists",
                permission.slug
            )));
        }
        self.permissions.insert(permission.id.clone(), permission);
        Ok(())
    }

    pub async fn assign_role(&self, principal_id: &str, role_id: &str) -> StoreResult<()> {
        let edge = RoleAssignment {
            principal_id: principal_id.to_string(),
            role_id: role_id.to_string(),
        };
        let mut assignments = self.assignments.write().await;
        if assignments.contains(&edge) {
            return Err(StoreError::Conflict(format!(
                "role {role_id} already assigned to {principal_id}"
            )));
        }
        assignments.push(edge);
        Ok(())
    }

    pub async fn grant_permission(&self, role_id: &str, permission_id: &str) -> StoreResult<()> {
        let edge = PermissionGrant {
            role_id: role_id.to_string(),
            permission_id: permission_id.to_string(),
        };
        let mut grants = self.grants.write().await;
        if grants.contains(&edge) {
            return Err(StoreError::Conflict(format!(
                "permission {permission_id} already granted to {role_id}"
            )));
        }
        grants.push(edge);
        Ok(())
    }

    /// Insert or replace a principal (synchronous, for seeding and tests)
    pub fn put_principal(&self, principal: Principal) -> StoreResult<()> {
        let email = normalize_email(&principal.email);
        match self.by_email.entry(email.clone()) {
            Entry::Occupied(entry) if entry.get() != &principal.id => {
                return Err(StoreError::Conflict(format!("email '{email}' is taken")));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(principal.id.clone());
            }
        }

        if let Some(previous) = self.principals.insert(principal.id.clone(), principal) {
            if previous.email != email {
                self.by_email.remove(&previous.email);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        self.simulate_latency().await;
        let email = normalize_email(email);
        let Some(id) = self.by_email.get(&email).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.principals.get(&id).map(|p| p.clone()))
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Principal>> {
        self.simulate_latency().await;
        Ok(self.principals.get(id).map(|p| p.clone()))
    }

    async fn list(&self) -> StoreResult<Vec<Principal>> {
        self.simulate_latency().await;
        let mut all: Vec<Principal> = self.principals.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(all)
    }

    async fn save(&self, principal: &Principal) -> StoreResult<()> {
        self.simulate_latency().await;
        self.put_principal(principal.clone())
    }

    async fn advance_token_version(
        &self,
        id: &str,
        expected: Option<u64>,
    ) -> StoreResult<Option<u64>> {
        self.simulate_latency().await;
        let Some(mut principal) = self.principals.get_mut(id) else {
            return Ok(None);
        };

        if let Some(expected) = expected {
            if principal.token_version != expected {
                return Ok(None);
            }
        }

        principal.token_version += 1;
        principal.updated_at = Utc::now();
        Ok(Some(principal.token_version))
    }
}

#[async_trait::async_trait]
impl RoleStore for MemoryStore {
    async fn role_assignments_for(&self, principal_id: &str) -> StoreResult<Vec<RoleAssignment>> {
        self.simulate_latency().await;
        let assignments = self.assignments.read().await;
        Ok(assignments
            .iter()
            .filter(|a| a.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn grants_for_roles(&self, role_ids: &[String]) -> StoreResult<Vec<PermissionGrant>> {
        self.simulate_latency().await;
        let wanted: HashSet<&String> = role_ids.iter().collect();
        let grants = self.grants.read().await;
        Ok(grants
            .iter()
            .filter(|g| wanted.contains(&g.role_id))
            .cloned()
            .collect())
    }

    async fn roles_by_id(&self, ids: &[String]) -> StoreResult<Vec<Role>> {
        self.simulate_latency().await;
        Ok(ids
            .iter()
            .filter_map(|id| self.roles.get(id).map(|r| r.clone()))
            .collect())
    }

    async fn permissions_by_id(&self, ids: &[String]) -> StoreResult<Vec<Permission>> {
        self.simulate_latency().await;
        Ok(ids
            .iter()
            .filter_map(|id| self.permissions.get(id).map(|p| p.clone()))
            .collect())
    }
}
