//! Role assignment and permission grant document schemas
//!
//! Both are plain edges; the compound unique index keeps each pair unique.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{parse_id, Metadata};
use crate::store::{PermissionGrant, RoleAssignment, StoreResult};

pub const ROLE_ASSIGNMENT_COLLECTION: &str = "role_assignments";
pub const PERMISSION_GRANT_COLLECTION: &str = "permission_grants";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RoleAssignmentDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub principal_id: ObjectId,

    pub role_id: ObjectId,
}

impl RoleAssignmentDoc {
    pub fn from_assignment(edge: &RoleAssignment) -> StoreResult<Self> {
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            principal_id: parse_id(&edge.principal_id)?,
            role_id: parse_id(&edge.role_id)?,
        })
    }
}

impl From<RoleAssignmentDoc> for RoleAssignment {
    fn from(doc: RoleAssignmentDoc) -> Self {
        Self {
            principal_id: doc.principal_id.to_hex(),
            role_id: doc.role_id.to_hex(),
        }
    }
}

impl IntoIndexes for RoleAssignmentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "principal_id": 1, "role_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("principal_role_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RoleAssignmentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PermissionGrantDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub role_id: ObjectId,

    pub permission_id: ObjectId,
}

impl PermissionGrantDoc {
    pub fn from_grant(edge: &PermissionGrant) -> StoreResult<Self> {
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            role_id: parse_id(&edge.role_id)?,
            permission_id: parse_id(&edge.permission_id)?,
        })
    }
}

impl From<PermissionGrantDoc> for PermissionGrant {
    fn from(doc: PermissionGrantDoc) -> Self {
        Self {
            role_id: doc.role_id.to_hex(),
            permission_id: doc.permission_id.to_hex(),
        }
    }
}

impl IntoIndexes for PermissionGrantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "role_id": 1, "permission_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("role_permission_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for PermissionGrantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
