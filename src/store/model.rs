//! Domain records held by the credential and role stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gender as recorded in personal data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

/// Marital status as recorded in personal data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaritalStatus {
    #[default]
    Single,
    Married,
}

/// Optional personal details attached to a principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalData {
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub marital_status: MaritalStatus,
}

/// Identity record with credentials and the token version
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    /// Unique, stored lower-cased
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    /// Revocation counter; a token is valid only while its `ver` equals this
    pub token_version: u64,
    pub personal_data: Option<PersonalData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: normalize_email(email),
            password_hash,
            is_active: true,
            token_version: 0,
            personal_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot with credential fields stripped
    pub fn view(&self) -> PrincipalView {
        PrincipalView::from(self)
    }
}

/// A principal as it may leave the service: no password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalView {
    pub id: String,
    pub email: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<PersonalData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Principal> for PrincipalView {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id.clone(),
            email: p.email.clone(),
            is_active: p.is_active,
            personal_data: p.personal_data.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Named role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
}

/// Permission identified by a stable slug such as `user.read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
}

/// Principal ↔ role edge, unique per pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub principal_id: String,
    pub role_id: String,
}

/// Role ↔ permission edge, unique per pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionGrant {
    pub role_id: String,
    pub permission_id: String,
}

/// Emails are matched case-insensitively and without surrounding whitespace
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_strips_password_hash() {
        let principal = Principal::new("p-1", "Someone@Example.com ", "$argon2id$secret".into());
        let json = serde_json::to_string(&principal.view()).unwrap();

        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
        assert!(json.contains("\"email\":\"someone@example.com\""));
        assert!(json.contains("\"isActive\":true"));
    }

    #[test]
    fn test_personal_data_serialization() {
        let data = PersonalData {
            name: "Admin".into(),
            surname: "User".into(),
            patronymic: "Admin".into(),
            gender: Gender::Female,
            marital_status: MaritalStatus::Married,
        };

        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"gender\":\"female\""));
        assert!(json.contains("\"maritalStatus\":\"married\""));
    }
}
