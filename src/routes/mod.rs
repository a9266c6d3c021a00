//! HTTP routes for Wicket

pub mod auth;
pub mod cookies;
pub mod health;
pub mod response;
pub mod users;
pub mod validation;

use hyper::Request;

pub use auth::handle_auth_request;
pub use health::{health_check, version_info};
pub use response::{
    apply_cors, empty_body, error_response, full_body, json_response, not_found_response,
    preflight_response, BoxBody,
};
pub use users::handle_users_request;

use crate::auth::{extract_token_from_header, Authenticated};
use crate::server::AppState;
use crate::types::WicketError;

/// Principal a handler acted for, left in response extensions for the
/// request audit
#[derive(Debug, Clone)]
pub struct AuditPrincipal(pub String);

/// Resolve the Bearer token of `req` to a live session
pub(crate) async fn authenticate_request<B>(
    state: &AppState,
    req: &Request<B>,
) -> Result<Authenticated, WicketError> {
    let token = extract_token_from_header(response::get_auth_header(req))
        .ok_or(WicketError::NotAuthenticated)?;
    state.sessions.authenticate(token).await
}
