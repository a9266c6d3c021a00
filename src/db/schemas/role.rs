//! Role and permission document schemas

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{parse_id, Metadata};
use crate::store::{Permission, Role, StoreResult};

pub const ROLE_COLLECTION: &str = "roles";
pub const PERMISSION_COLLECTION: &str = "permissions";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RoleDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl RoleDoc {
    pub fn from_role(role: &Role) -> StoreResult<Self> {
        Ok(Self {
            _id: Some(parse_id(&role.id)?),
            metadata: Metadata::new(),
            name: role.name.clone(),
            description: role.description.clone(),
            is_active: role.is_active,
        })
    }

    pub fn into_role(self) -> Option<Role> {
        Some(Role {
            id: self._id?.to_hex(),
            name: self.name,
            description: self.description,
            is_active: self.is_active,
        })
    }
}

impl IntoIndexes for RoleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RoleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PermissionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Stable machine identifier, e.g. `user.read`
    pub slug: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub resource: String,

    pub action: String,
}

impl PermissionDoc {
    pub fn from_permission(permission: &Permission) -> StoreResult<Self> {
        Ok(Self {
            _id: Some(parse_id(&permission.id)?),
            metadata: Metadata::new(),
            name: permission.name.clone(),
            slug: permission.slug.to_lowercase(),
            description: permission.description.clone(),
            resource: permission.resource.clone(),
            action: permission.action.clone(),
        })
    }

    pub fn into_permission(self) -> Option<Permission> {
        Some(Permission {
            id: self._id?.to_hex(),
            name: self.name,
            slug: self.slug,
            description: self.description,
            resource: self.resource,
            action: self.action,
        })
    }
}

impl IntoIndexes for PermissionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "slug": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("slug_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "name": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("name_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "resource": 1, "action": 1 },
                Some(
                    IndexOptions::builder()
                        .name("resource_action_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PermissionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
