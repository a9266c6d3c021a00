//! Response and request helpers shared by the route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::types::{FieldError, WicketError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest JSON body a route will read
const MAX_BODY_BYTES: usize = 10 * 1024;

/// Error envelope returned by every failing route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Render an error, logging detail that must not reach the caller
pub fn error_response(err: WicketError) -> Response<BoxBody> {
    match &err {
        WicketError::Internal(detail) | WicketError::Config(detail) => {
            error!("Request failed: {}", detail)
        }
        WicketError::Unavailable(detail) => warn!("Request failed, store unavailable: {}", detail),
        _ => {}
    }

    let status = err.status_code();
    let code = err.code();
    let message = err.public_message();
    let errors = match err {
        WicketError::Validation(errors) => errors,
        _ => Vec::new(),
    };

    json_response(
        status,
        &ErrorResponse {
            success: false,
            message,
            code,
            errors,
        },
    )
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    error_response(WicketError::NotFound(format!("no route for {path}")))
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "success": false, "message": "Method not allowed" }),
    )
}

pub fn preflight_response() -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

/// Add CORS headers for `origin` to any response
pub fn apply_cors(response: &mut Response<BoxBody>, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    if origin != "*" {
        // Cookies only travel cross-origin to an explicit origin
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

/// Append a header, skipping values that are not valid header text
pub fn append_header(response: &mut Response<BoxBody>, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().append(name, value);
        }
        Err(e) => warn!("Dropping invalid {} header: {}", name, e),
    }
}

/// Read and deserialize a JSON body of at most 10 KiB.
///
/// An empty body deserializes as `{}` so optional-field requests work
/// without one.
pub async fn parse_json_body<T: DeserializeOwned>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, WicketError> {
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| WicketError::BadRequest(format!("Failed to read body: {e}")))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_str("{}")?);
    }

    serde_json::from_slice(&bytes).map_err(|e| WicketError::BadRequest(format!("Invalid JSON: {e}")))
}

pub fn get_auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}
