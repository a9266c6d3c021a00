//! Audit sink implementations

use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::info;

use super::{AuditEvent, AuditSink};
use crate::db::schemas::{AuditLogDoc, AUDIT_LOG_COLLECTION};
use crate::db::{MongoClient, MongoCollection};

/// Appends one JSON object per line to a file
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlSink {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        info!("Audit logging to {}", path.display());
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlSink {
    async fn write(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let mut line = event.to_jsonl()?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Stores events in the `audit_logs` collection
pub struct MongoSink {
    collection: MongoCollection<AuditLogDoc>,
}

impl MongoSink {
    pub async fn new(client: &MongoClient) -> anyhow::Result<Self> {
        Ok(Self {
            collection: client.collection(AUDIT_LOG_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl AuditSink for MongoSink {
    async fn write(&self, event: &AuditEvent) -> anyhow::Result<()> {
        self.collection.insert_one(AuditLogDoc::from(event)).await?;
        Ok(())
    }
}

/// Emits events as structured log lines only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl AuditSink for TracingSink {
    async fn write(&self, event: &AuditEvent) -> anyhow::Result<()> {
        info!(
            target: "wicket::audit",
            action = event.action.as_str(),
            principal = event.principal_id.as_deref().unwrap_or("-"),
            method = %event.method,
            path = %event.path,
            status = event.status_code,
            ip = event.ip.as_deref().unwrap_or("-"),
            "audit"
        );
        Ok(())
    }
}
