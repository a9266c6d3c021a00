//! Authentication routes
//!
//! - `POST /api/v1/auth/login`: credentials in, access token out, refresh cookie set
//! - `POST /api/v1/auth/refresh`: rotate the refresh cookie (or body token)
//! - `POST /api/v1/auth/logout`: revoke every token of the caller
//! - `GET /api/v1/auth/me`: the caller with roles and permission slugs

use hyper::header::SET_COOKIE;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use super::cookies::{clear_refresh_cookie, read_cookie, refresh_cookie, REFRESH_COOKIE};
use super::response::{
    append_header, error_response, json_response, method_not_allowed, not_found_response,
    parse_json_body, BoxBody,
};
use super::validation::{LoginRequest, RefreshRequest};
use super::authenticate_request;
use crate::audit::{AuditAction, AuditEvent};
use crate::auth::TokenPair;
use crate::server::AppState;
use crate::store::{PrincipalView, Role};
use crate::types::WicketError;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const REFRESH_PATH: &str = "/api/v1/auth/refresh";
const LOGOUT_PATH: &str = "/api/v1/auth/logout";
const ME_PATH: &str = "/api/v1/auth/me";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: &'static str,
    pub token_type: &'static str,
    pub user: PrincipalView,
    pub access_token: String,
    pub access_token_expires_in: String,
    pub access_token_max_age_ms: u64,
    pub refresh_token_expires_in: String,
    pub refresh_token_max_age_ms: u64,
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: &'static str,
    pub token_type: &'static str,
    pub access_token: String,
    pub access_token_expires_in: String,
    pub access_token_max_age_ms: u64,
    pub refresh_token_expires_in: String,
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub success: bool,
    pub user: PrincipalView,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
}

/// Audit event for an auth route, with the client's address filled in
fn auth_event(action: AuditAction, path: &str, headers: &HeaderMap, addr: SocketAddr) -> AuditEvent {
    AuditEvent::new(action, "POST", path).with_client(headers, Some(addr))
}

/// Attach the refresh token as an HttpOnly cookie
fn set_refresh_cookie(response: &mut Response<BoxBody>, tokens: &TokenPair, secure: bool) {
    append_header(
        response,
        SET_COOKIE,
        &refresh_cookie(
            &tokens.refresh_token,
            tokens.refresh_token_expires_in.as_secs(),
            secure,
        ),
    );
}

/// POST /api/v1/auth/login
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let headers = req.headers().clone();

    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    let login = match body.validate() {
        Ok(l) => l,
        Err(e) => return error_response(e),
    };

    let outcome = match state
        .sessions
        .login(&login.email, &login.password, login.remember_me)
        .await
    {
        Ok(o) => o,
        Err(e) => {
            if matches!(e, WicketError::InvalidCredentials) {
                state.audit.record(
                    auth_event(AuditAction::LoginFailed, LOGIN_PATH, &headers, addr)
                        .with_status(StatusCode::UNAUTHORIZED.as_u16())
                        .with_metadata(serde_json::json!({ "email": login.email })),
                );
            }
            return error_response(e);
        }
    };

    state.audit.record(
        auth_event(AuditAction::Login, LOGIN_PATH, &headers, addr)
            .with_principal(&outcome.principal.id)
            .with_metadata(serde_json::json!({ "email": login.email })),
    );

    let tokens = outcome.tokens;
    let mut response = json_response(
        StatusCode::OK,
        &LoginResponse {
            success: true,
            message: "Logged in successfully",
            token_type: "Bearer",
            user: outcome.principal,
            access_token: tokens.access_token.clone(),
            access_token_expires_in: tokens.access_token_expires_in.label.clone(),
            access_token_max_age_ms: tokens.access_token_expires_in.millis,
            refresh_token_expires_in: tokens.refresh_token_expires_in.label.clone(),
            refresh_token_max_age_ms: tokens.refresh_token_expires_in.millis,
            remember_me: outcome.remember_me,
        },
    );
    set_refresh_cookie(&mut response, &tokens, state.args.secure_cookies);
    response
}

/// POST /api/v1/auth/refresh
///
/// The cookie wins over a `refreshToken` body field. A rejected token also
/// clears the cookie.
async fn handle_refresh(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let headers = req.headers().clone();
    let from_cookie = read_cookie(&headers, REFRESH_COOKIE);

    let token = match from_cookie {
        Some(t) => t,
        None => match parse_json_body::<RefreshRequest>(req).await {
            Ok(RefreshRequest {
                refresh_token: Some(t),
            }) if !t.is_empty() => t,
            Ok(_) => {
                debug!("Refresh without a token");
                return error_response(WicketError::InvalidRefreshToken);
            }
            Err(e) => return error_response(e),
        },
    };

    let secure = state.args.secure_cookies;
    let outcome = match state.sessions.refresh(&token).await {
        Ok(o) => o,
        // Only a rejected token is dropped; outages leave the cookie for a retry
        Err(e @ WicketError::InvalidRefreshToken) => {
            let mut response = error_response(e);
            append_header(&mut response, SET_COOKIE, &clear_refresh_cookie(secure));
            return response;
        }
        Err(e) => return error_response(e),
    };

    state.audit.record(
        auth_event(AuditAction::Refresh, REFRESH_PATH, &headers, addr)
            .with_principal(&outcome.principal.id),
    );

    let tokens = outcome.tokens;
    let mut response = json_response(
        StatusCode::OK,
        &RefreshResponse {
            success: true,
            message: "Token refreshed",
            token_type: "Bearer",
            access_token: tokens.access_token.clone(),
            access_token_expires_in: tokens.access_token_expires_in.label.clone(),
            access_token_max_age_ms: tokens.access_token_expires_in.millis,
            refresh_token_expires_in: tokens.refresh_token_expires_in.label.clone(),
            remember_me: outcome.remember_me,
        },
    );
    set_refresh_cookie(&mut response, &tokens, secure);
    response
}

/// POST /api/v1/auth/logout
async fn handle_logout(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let session = match authenticate_request(&state, &req).await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    state.sessions.logout(session.id()).await;
    info!(principal = %session.id(), "Session closed");

    state.audit.record(
        auth_event(AuditAction::Logout, LOGOUT_PATH, req.headers(), addr).with_principal(session.id()),
    );

    let mut response = json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "message": "Logged out" }),
    );
    append_header(
        &mut response,
        SET_COOKIE,
        &clear_refresh_cookie(state.args.secure_cookies),
    );
    response
}

/// GET /api/v1/auth/me
async fn handle_me(req: Request<hyper::body::Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let session = match authenticate_request(&state, &req).await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let resolver = state.sessions.resolver();
    let roles = match resolver.get_roles(session.id()).await {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    let permissions = match resolver.permission_slugs(session.id()).await {
        Ok(p) => p.into_iter().collect(),
        Err(e) => return error_response(e),
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            success: true,
            user: session.principal,
            roles,
            permissions,
        },
    )
}

/// Route `/api/v1/auth/*`
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, LOGIN_PATH) => handle_login(req, state, addr).await,
        (Method::POST, REFRESH_PATH) => handle_refresh(req, state, addr).await,
        (Method::POST, LOGOUT_PATH) => handle_logout(req, state, addr).await,
        (Method::GET, ME_PATH) => handle_me(req, state).await,

        (_, LOGIN_PATH) | (_, REFRESH_PATH) | (_, LOGOUT_PATH) | (_, ME_PATH) => method_not_allowed(),

        _ => not_found_response(&path),
    }
}
