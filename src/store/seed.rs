//! Default roles, permissions and principals
//!
//! Used by the `wicket-seed` binary against MongoDB and by dev mode to fill
//! the in-memory store.

use tracing::info;

use super::{
    MemoryStore, Permission, PermissionGrant, PersonalData, Principal, Role, RoleAssignment,
    StoreResult,
};
use crate::auth::CredentialHasher;
use crate::types::WicketError;

const ADMIN_ROLE: &str = "Admin";
const USER_ROLE: &str = "User";

/// (slug, name, description)
const PERMISSIONS: &[(&str, &str, &str)] = &[
    ("user.create", "Create users", "Can create new users"),
    ("user.read", "Read users", "Can view user details and online status"),
    ("user.update", "Update users", "Can update user details"),
    ("user.delete", "Delete users", "Can delete users"),
    ("role.create", "Create roles", "Can create new roles"),
    ("role.read", "Read roles", "Can view roles"),
    ("role.update", "Update roles", "Can update roles"),
    ("role.delete", "Delete roles", "Can delete roles"),
];

/// Slugs granted to the `User` role; `Admin` receives every permission
const USER_ROLE_PERMISSIONS: &[&str] = &["user.read"];

/// (email, password, name, role)
const PRINCIPALS: &[(&str, &str, &str, &str)] = &[
    ("admin@test.az", "admin123", "Admin", ADMIN_ROLE),
    ("demo@test.az", "demo1234", "Test", USER_ROLE),
];

/// A complete, internally consistent seed data set
#[derive(Debug, Clone)]
pub struct SeedData {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub principals: Vec<Principal>,
    pub assignments: Vec<RoleAssignment>,
    pub grants: Vec<PermissionGrant>,
}

impl SeedData {
    /// Build the default data set, drawing ids from `new_id`
    pub fn build(
        hasher: &dyn CredentialHasher,
        mut new_id: impl FnMut() -> String,
    ) -> Result<Self, WicketError> {
        let permissions: Vec<Permission> = PERMISSIONS
            .iter()
            .map(|&(slug, name, description)| {
                let (resource, action) = slug.split_once('.').unwrap_or((slug, ""));
                Permission {
                    id: new_id(),
                    name: name.to_string(),
                    slug: slug.to_string(),
                    description: Some(description.to_string()),
                    resource: resource.to_string(),
                    action: action.to_string(),
                }
            })
            .collect();

        let admin = Role {
            id: new_id(),
            name: ADMIN_ROLE.into(),
            description: Some("Fully privileged administrator".into()),
            is_active: true,
        };
        let user = Role {
            id: new_id(),
            name: USER_ROLE.into(),
            description: Some("Standard user".into()),
            is_active: true,
        };

        let mut grants: Vec<PermissionGrant> = permissions
            .iter()
            .map(|p| PermissionGrant {
                role_id: admin.id.clone(),
                permission_id: p.id.clone(),
            })
            .collect();
        grants.extend(
            permissions
                .iter()
                .filter(|p| USER_ROLE_PERMISSIONS.contains(&p.slug.as_str()))
                .map(|p| PermissionGrant {
                    role_id: user.id.clone(),
                    permission_id: p.id.clone(),
                }),
        );

        let mut principals = Vec::with_capacity(PRINCIPALS.len());
        let mut assignments = Vec::with_capacity(PRINCIPALS.len());
        for (email, password, name, role_name) in PRINCIPALS {
            let mut principal = Principal::new(new_id(), email, hasher.hash(password)?);
            principal.personal_data = Some(PersonalData {
                name: name.to_string(),
                surname: "User".into(),
                patronymic: name.to_string(),
                gender: Default::default(),
                marital_status: Default::default(),
            });

            let role_id = if *role_name == ADMIN_ROLE {
                admin.id.clone()
            } else {
                user.id.clone()
            };
            assignments.push(RoleAssignment {
                principal_id: principal.id.clone(),
                role_id,
            });
            principals.push(principal);
        }

        Ok(Self {
            roles: vec![admin, user],
            permissions,
            principals,
            assignments,
            grants,
        })
    }

    /// Load into an in-memory store
    pub async fn load_into(self, store: &MemoryStore) -> StoreResult<()> {
        for permission in self.permissions {
            store.insert_permission(permission)?;
        }
        for role in self.roles {
            store.insert_role(role)?;
        }
        for principal in self.principals {
            store.put_principal(principal)?;
        }
        for grant in &self.grants {
            store
                .grant_permission(&grant.role_id, &grant.permission_id)
                .await?;
        }
        for assignment in &self.assignments {
            store
                .assign_role(&assignment.principal_id, &assignment.role_id)
                .await?;
        }

        info!("Seeded in-memory store with default roles and principals");
        Ok(())
    }
}
