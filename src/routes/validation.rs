//! Request body validation

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::store::normalize_email;
use crate::types::{FieldError, WicketError};

const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex"));

/// Body of `POST /api/v1/auth/login`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember_me: Option<bool>,
}

/// A login request that passed validation, email normalized
#[derive(Debug)]
pub struct ValidLogin {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
}

impl LoginRequest {
    /// Collect every field problem rather than stopping at the first
    pub fn validate(self) -> Result<ValidLogin, WicketError> {
        let mut errors = Vec::new();
        let email = normalize_email(&self.email);

        if email.is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        } else if !EMAIL_PATTERN.is_match(&email) {
            errors.push(FieldError::new("email", "Email is not a valid address"));
        }

        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        if !errors.is_empty() {
            return Err(WicketError::Validation(errors));
        }

        Ok(ValidLogin {
            email,
            password: self.password,
            remember_me: self.remember_me.unwrap_or(false),
        })
    }
}

/// Optional body of `POST /api/v1/auth/refresh`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}
