//! Principal document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{parse_id, Metadata};
use crate::store::{PersonalData, Principal, StoreResult};

pub const PRINCIPAL_COLLECTION: &str = "principals";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PrincipalDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Lower-cased, unique
    pub email: String,

    /// Argon2 PHC string
    pub password_hash: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Incremented on every login, refresh and logout
    #[serde(default)]
    pub token_version: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<PersonalData>,
}

fn default_true() -> bool {
    true
}

impl PrincipalDoc {
    pub fn from_principal(principal: &Principal) -> StoreResult<Self> {
        Ok(Self {
            _id: Some(parse_id(&principal.id)?),
            metadata: Metadata::with_times(principal.created_at, principal.updated_at),
            email: principal.email.clone(),
            password_hash: principal.password_hash.clone(),
            is_active: principal.is_active,
            token_version: i64::try_from(principal.token_version).unwrap_or(i64::MAX),
            personal_data: principal.personal_data.clone(),
        })
    }

    /// `None` for a document that was never persisted
    pub fn into_principal(self) -> Option<Principal> {
        let id = self._id?;
        Some(Principal {
            id: id.to_hex(),
            created_at: self.metadata.created(),
            updated_at: self.metadata.updated(),
            email: self.email,
            password_hash: self.password_hash,
            is_active: self.is_active,
            token_version: u64::try_from(self.token_version).unwrap_or(0),
            personal_data: self.personal_data,
        })
    }
}

impl IntoIndexes for PrincipalDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for PrincipalDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
