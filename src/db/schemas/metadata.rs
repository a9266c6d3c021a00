//! Bookkeeping fields shared by every document

use bson::DateTime;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// Soft-deleted documents are invisible to reads
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        Self {
            is_deleted: false,
            updated_at: Some(DateTime::now()),
            created_at: Some(DateTime::now()),
        }
    }

    /// Metadata carrying timestamps from a domain record
    pub fn with_times(created_at: chrono::DateTime<Utc>, updated_at: chrono::DateTime<Utc>) -> Self {
        Self {
            is_deleted: false,
            created_at: Some(DateTime::from_chrono(created_at)),
            updated_at: Some(DateTime::from_chrono(updated_at)),
        }
    }

    pub fn created(&self) -> chrono::DateTime<Utc> {
        self.created_at.map(|d| d.to_chrono()).unwrap_or_else(Utc::now)
    }

    pub fn updated(&self) -> chrono::DateTime<Utc> {
        self.updated_at
            .or(self.created_at)
            .map(|d| d.to_chrono())
            .unwrap_or_else(Utc::now)
    }
}
