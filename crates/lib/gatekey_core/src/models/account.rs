//! Account, credential and profile-mapping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A provider identity attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRef {
    pub profile_id: String,
    pub profile_type: String,
}

impl ProfileRef {
    pub fn new(profile_id: impl Into<String>, profile_type: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            profile_type: profile_type.into(),
        }
    }
}

/// An internal user account.
///
/// Created once at signup or first social login; the profile list grows as
/// more providers are linked to the same account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub create_date: DateTime<Utc>,
    pub is_admin: bool,
    pub profiles: Vec<ProfileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Email/password credential row. `email` is the uniqueness boundary for
/// local logins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPasswordCredential {
    pub email: String,
    pub account_id: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub create_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_date: Option<DateTime<Utc>>,
}

/// Resolves a third-party (profileId, profileType) pair to an internal
/// account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMapping {
    pub profile_id: String,
    pub profile_type: String,
    pub account_id: String,
    pub create_date: DateTime<Utc>,
}
