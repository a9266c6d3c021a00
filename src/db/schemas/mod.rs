//! Database schemas for Wicket
//!
//! MongoDB document structures for principals, the role graph and the audit
//! trail. Domain ids are the hex form of each document's `ObjectId`.

mod audit_log;
mod edges;
mod metadata;
mod principal;
mod role;

use bson::oid::ObjectId;

use crate::store::{StoreError, StoreResult};

pub use audit_log::{AuditLogDoc, AUDIT_LOG_COLLECTION};
pub use edges::{
    PermissionGrantDoc, RoleAssignmentDoc, PERMISSION_GRANT_COLLECTION,
    ROLE_ASSIGNMENT_COLLECTION,
};
pub use metadata::Metadata;
pub use principal::{PrincipalDoc, PRINCIPAL_COLLECTION};
pub use role::{PermissionDoc, RoleDoc, PERMISSION_COLLECTION, ROLE_COLLECTION};

/// Parse a domain id into an `ObjectId`
pub fn parse_id(id: &str) -> StoreResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| StoreError::Backend(format!("'{id}' is not an ObjectId")))
}

/// Parse many ids, skipping any that cannot refer to a stored document
pub fn parse_ids(ids: &[String]) -> Vec<ObjectId> {
    ids.iter().filter_map(|id| ObjectId::parse_str(id).ok()).collect()
}
