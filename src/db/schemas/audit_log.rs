//! Audit log document schema

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::audit::AuditEvent;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const AUDIT_LOG_COLLECTION: &str = "audit_logs";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AuditLogDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,

    /// e.g. `auth.login`, `request`
    pub action: String,

    pub method: String,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    pub status_code: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Bson>,
}

impl From<&AuditEvent> for AuditLogDoc {
    fn from(event: &AuditEvent) -> Self {
        let at = DateTime::from_chrono(event.timestamp);
        Self {
            _id: None,
            metadata: Metadata {
                is_deleted: false,
                created_at: Some(at),
                updated_at: Some(at),
            },
            principal_id: event.principal_id.clone(),
            action: event.action.as_str().to_string(),
            method: event.method.clone(),
            path: event.path.clone(),
            ip: event.ip.clone(),
            user_agent: event.user_agent.clone(),
            status_code: i32::from(event.status_code),
            details: event.metadata.as_ref().and_then(|m| bson::to_bson(m).ok()),
        }
    }
}

impl IntoIndexes for AuditLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "principal_id": 1, "action": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("principal_action_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AuditLogDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
