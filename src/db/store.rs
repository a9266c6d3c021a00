//! MongoDB implementation of the credential and role stores

use bson::{doc, DateTime};
use bson::oid::ObjectId;
use tracing::info;

use super::mongo::{MongoClient, MongoCollection};
use super::schemas::{
    parse_ids, PermissionDoc, PermissionGrantDoc, PrincipalDoc, RoleAssignmentDoc, RoleDoc,
    PERMISSION_COLLECTION, PERMISSION_GRANT_COLLECTION, PRINCIPAL_COLLECTION,
    ROLE_ASSIGNMENT_COLLECTION, ROLE_COLLECTION,
};
use crate::store::seed::SeedData;
use crate::store::{
    normalize_email, CredentialStore, Permission, PermissionGrant, Principal, Role,
    RoleAssignment, RoleStore, StoreResult,
};

/// Principals and the role graph, one collection each
#[derive(Clone)]
pub struct MongoStore {
    principals: MongoCollection<PrincipalDoc>,
    roles: MongoCollection<RoleDoc>,
    permissions: MongoCollection<PermissionDoc>,
    assignments: MongoCollection<RoleAssignmentDoc>,
    grants: MongoCollection<PermissionGrantDoc>,
}

impl MongoStore {
    /// Open all collections, creating their indexes
    pub async fn new(client: &MongoClient) -> StoreResult<Self> {
        Ok(Self {
            principals: client.collection(PRINCIPAL_COLLECTION).await?,
            roles: client.collection(ROLE_COLLECTION).await?,
            permissions: client.collection(PERMISSION_COLLECTION).await?,
            assignments: client.collection(ROLE_ASSIGNMENT_COLLECTION).await?,
            grants: client.collection(PERMISSION_GRANT_COLLECTION).await?,
        })
    }

    /// Wipe every collection and load `seed` in its place
    pub async fn reseed(&self, seed: SeedData) -> StoreResult<()> {
        self.grants.delete_many(doc! {}).await?;
        self.assignments.delete_many(doc! {}).await?;
        self.permissions.delete_many(doc! {}).await?;
        self.roles.delete_many(doc! {}).await?;
        self.principals.delete_many(doc! {}).await?;
        info!("Cleared principals and role graph");

        for permission in &seed.permissions {
            self.permissions
                .insert_one(PermissionDoc::from_permission(permission)?)
                .await?;
        }
        for role in &seed.roles {
            self.roles.insert_one(RoleDoc::from_role(role)?).await?;
        }
        for grant in &seed.grants {
            self.grants
                .insert_one(PermissionGrantDoc::from_grant(grant)?)
                .await?;
        }
        for principal in &seed.principals {
            self.principals
                .insert_one(PrincipalDoc::from_principal(principal)?)
                .await?;
        }
        for assignment in &seed.assignments {
            self.assignments
                .insert_one(RoleAssignmentDoc::from_assignment(assignment)?)
                .await?;
        }

        info!(
            roles = seed.roles.len(),
            permissions = seed.permissions.len(),
            principals = seed.principals.len(),
            "Seeded MongoDB"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MongoStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let found = self
            .principals
            .find_one(doc! { "email": normalize_email(email) })
            .await?;
        Ok(found.and_then(PrincipalDoc::into_principal))
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Principal>> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let found = self.principals.find_one(doc! { "_id": oid }).await?;
        Ok(found.and_then(PrincipalDoc::into_principal))
    }

    async fn list(&self) -> StoreResult<Vec<Principal>> {
        let docs = self.principals.find_many(doc! {}).await?;
        Ok(docs.into_iter().filter_map(PrincipalDoc::into_principal).collect())
    }

    async fn save(&self, principal: &Principal) -> StoreResult<()> {
        let doc = PrincipalDoc::from_principal(principal)?;
        let filter = doc! { "_id": doc._id };
        self.principals.upsert(filter, doc).await
    }

    async fn advance_token_version(
        &self,
        id: &str,
        expected: Option<u64>,
    ) -> StoreResult<Option<u64>> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        let mut filter = doc! { "_id": oid };
        if let Some(expected) = expected {
            filter.insert("token_version", i64::try_from(expected).unwrap_or(i64::MAX));
        }

        let updated = self
            .principals
            .find_one_and_update(
                filter,
                doc! {
                    "$inc": { "token_version": 1_i64 },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;

        Ok(updated.map(|d| u64::try_from(d.token_version).unwrap_or(0)))
    }
}

#[async_trait::async_trait]
impl RoleStore for MongoStore {
    async fn role_assignments_for(&self, principal_id: &str) -> StoreResult<Vec<RoleAssignment>> {
        let Ok(oid) = ObjectId::parse_str(principal_id) else {
            return Ok(Vec::new());
        };
        let docs = self.assignments.find_many(doc! { "principal_id": oid }).await?;
        Ok(docs.into_iter().map(RoleAssignment::from).collect())
    }

    async fn grants_for_roles(&self, role_ids: &[String]) -> StoreResult<Vec<PermissionGrant>> {
        let oids = parse_ids(role_ids);
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .grants
            .find_many(doc! { "role_id": { "$in": oids } })
            .await?;
        Ok(docs.into_iter().map(PermissionGrant::from).collect())
    }

    async fn roles_by_id(&self, ids: &[String]) -> StoreResult<Vec<Role>> {
        let oids = parse_ids(ids);
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.roles.find_many(doc! { "_id": { "$in": oids } }).await?;

        // Keep the caller's order so the first assigned role stays first
        let mut roles: Vec<Role> = docs.into_iter().filter_map(RoleDoc::into_role).collect();
        roles.sort_by_key(|r| ids.iter().position(|id| *id == r.id));
        Ok(roles)
    }

    async fn permissions_by_id(&self, ids: &[String]) -> StoreResult<Vec<Permission>> {
        let oids = parse_ids(ids);
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .permissions
            .find_many(doc! { "_id": { "$in": oids } })
            .await?;
        Ok(docs.into_iter().filter_map(PermissionDoc::into_permission).collect())
    }
}
