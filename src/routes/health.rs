//! Health and version endpoints
//!
//! - `/api/health`: liveness, always 200 while the process serves requests
//! - `/version`: build information for deployment verification

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::response::{json_response, BoxBody};
use crate::server::AppState;

/// Liveness report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    /// Seconds since the server state was built
    pub uptime: u64,
    /// Principals with at least one live realtime connection
    pub online_count: usize,
    /// "development" or "production"
    pub mode: &'static str,
    pub timestamp: String,
}

/// Build information
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        uptime: state.started_at.elapsed().as_secs(),
        online_count: state.presence.online_count(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// GET /api/health
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// GET /version
pub fn version_info() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "wicket",
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLogger, TracingSink};
    use crate::config::Args;
    use clap::Parser;

    #[tokio::test]
    async fn test_health_reports_online_count() {
        let args = Args::try_parse_from(["wicket", "--dev-mode"]).unwrap();
        let (audit, _writer) = AuditLogger::spawn(Arc::new(TracingSink));
        let state = AppState::in_memory(args, audit).await.unwrap();
        let _guard = state.presence.connect("someone");

        let health = build_health_response(&state);
        assert!(health.healthy);
        assert_eq!(health.online_count, 1);
        assert_eq!(health.mode, "development");

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["onlineCount"], 1);
    }

    #[test]
    fn test_version_names_service() {
        let response = version_info();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
