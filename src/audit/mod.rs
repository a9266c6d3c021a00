//! Audit trail
//!
//! Records authentication events and API requests without ever holding up
//! the request that produced them. [`AuditLogger::record`] hands the event
//! to a background writer over an unbounded channel; the writer owns the
//! [`AuditSink`] and logs (then forgets) any write failure. Each write is
//! bounded, so a hung sink costs one event rather than the whole queue.

mod sinks;

use chrono::{DateTime, Utc};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub use sinks::{JsonlSink, MongoSink, TracingSink};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "auth.login")]
    Login,
    #[serde(rename = "auth.login_failed")]
    LoginFailed,
    #[serde(rename = "auth.refresh")]
    Refresh,
    #[serde(rename = "auth.logout")]
    Logout,
    /// Any non-auth API call
    #[serde(rename = "request")]
    Request,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "auth.login",
            Self::LoginFailed => "auth.login_failed",
            Self::Refresh => "auth.refresh",
            Self::Logout => "auth.logout",
            Self::Request => "request",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    pub action: AuditAction,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            principal_id: None,
            action,
            method: method.into(),
            path: path.into(),
            ip: None,
            user_agent: None,
            status_code: 200,
            metadata: None,
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Fill `ip` and `user_agent` from the request
    pub fn with_client(mut self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        self.ip = client_ip(headers, peer);
        self.user_agent = headers
            .get(hyper::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// First `X-Forwarded-For` hop, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

/// Destination for audit records
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

/// Non-blocking front of the audit trail
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditLogger {
    /// Start the background writer for `sink`
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_timeout(sink, DEFAULT_WRITE_TIMEOUT)
    }

    /// Start the background writer, abandoning any write that takes longer
    /// than `write_timeout`
    pub fn spawn_with_timeout(
        sink: Arc<dyn AuditSink>,
        write_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match tokio::time::timeout(write_timeout, sink.write(&event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(action = event.action.as_str(), "Failed to write audit event: {:#}", e);
                    }
                    Err(_) => {
                        warn!(
                            action = event.action.as_str(),
                            timeout_ms = write_timeout.as_millis() as u64,
                            "Audit write timed out, event dropped"
                        );
                    }
                }
            }
            debug!("Audit writer stopped");
        });
        (Self { tx }, handle)
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn record(&self, event: AuditEvent) {
        if self.tx.send(event).is_err() {
            error!("Audit writer is gone, event dropped");
        }
    }
}
