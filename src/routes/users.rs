//! `GET /api/v1/users`: every principal with its live presence

use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::response::{error_response, json_response, method_not_allowed, BoxBody};
use super::{authenticate_request, AuditPrincipal};
use crate::server::AppState;
use crate::store::{bounded, PrincipalView};

/// Permission required to list principals
pub const USER_READ: &str = "user.read";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    #[serde(flatten)]
    pub user: PrincipalView,
    pub is_online: bool,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub success: bool,
    pub data: Vec<UserEntry>,
}

pub async fn handle_users_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if req.method() != Method::GET {
        return method_not_allowed();
    }

    let session = match authenticate_request(&state, &req).await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let principal = AuditPrincipal(session.id().to_string());

    let mut response = match list_users(&state, session.id()).await {
        Ok(data) => json_response(StatusCode::OK, &UsersResponse { success: true, data }),
        Err(e) => error_response(e),
    };
    response.extensions_mut().insert(principal);
    response
}

async fn list_users(
    state: &AppState,
    caller: &str,
) -> Result<Vec<UserEntry>, crate::types::WicketError> {
    state.sessions.resolver().require(caller, USER_READ).await?;

    let principals = bounded(
        state.args.store_timeout(),
        "list principals",
        state.credentials.list(),
    )
    .await?;

    Ok(principals
        .iter()
        .map(|p| UserEntry {
            user: p.view(),
            is_online: state.presence.is_online(&p.id),
        })
        .collect())
}
