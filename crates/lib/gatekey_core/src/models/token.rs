//! Token ledger records and access-token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kinds of single-use tokens kept in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    State,
    Refresh,
    EmailVerification,
}

impl TokenType {
    /// Wire/storage name, used as the sort key of the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::State => "STATE",
            TokenType::Refresh => "REFRESH",
            TokenType::EmailVerification => "EMAIL_VERIFICATION",
        }
    }
}

/// One entry in the single-use token ledger.
///
/// Lifecycle is CREATED (active) → EXPIRED, terminal. Records are marked
/// rather than deleted so the account id is kept for auditing. Type-specific
/// payload (e.g. the email address of a verification token) lives in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub expired: bool,
    pub create_date: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    /// Email address attached to a verification token, if any.
    pub fn email(&self) -> Option<&str> {
        self.extra.get("email").and_then(Value::as_str)
    }
}

/// Claim bundle signed into access tokens.
///
/// `iat`/`exp` are epoch milliseconds. Fields beyond the registered ones are
/// whatever the issuance hook injected (roles, tenant id, ...) and round-trip
/// through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccessTokenClaims {
    /// Role names carried by the token, empty when the claim is absent or not
    /// a string array.
    pub fn roles(&self) -> Vec<&str> {
        self.extra
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Tenant (`cid`) claim, if present.
    pub fn tenant(&self) -> Option<&str> {
        self.extra.get("cid").and_then(Value::as_str)
    }

    /// Look up a claim by name, covering registered and hook-injected fields.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "sub" => Some(Value::String(self.sub.clone())),
            "iat" => self.iat.map(Value::from),
            "exp" => self.exp.map(Value::from),
            _ => self.extra.get(name).cloned(),
        }
    }
}

/// Access/refresh pair handed out at login and rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_type_storage_names() {
        assert_eq!(TokenType::State.as_str(), "STATE");
        assert_eq!(TokenType::Refresh.as_str(), "REFRESH");
        assert_eq!(TokenType::EmailVerification.as_str(), "EMAIL_VERIFICATION");
    }

    #[test]
    fn token_record_roundtrips_with_extra_fields() {
        let value = json!({
            "token": "abc",
            "type": "EMAIL_VERIFICATION",
            "accountId": "acct-1",
            "expired": false,
            "createDate": "2024-05-01T00:00:00Z",
            "email": "a@b.com",
        });
        let record: TokenRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(record.token_type, TokenType::EmailVerification);
        assert_eq!(record.email(), Some("a@b.com"));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn claims_accessors() {
        let claims: AccessTokenClaims = serde_json::from_value(json!({
            "sub": "acct-1",
            "iat": 1_000,
            "exp": 2_000,
            "roles": ["editor", "viewer"],
            "cid": "tenant-9",
        }))
        .unwrap();
        assert_eq!(claims.roles(), vec!["editor", "viewer"]);
        assert_eq!(claims.tenant(), Some("tenant-9"));
        assert_eq!(claims.get("sub"), Some(json!("acct-1")));
        assert_eq!(claims.get("exp"), Some(json!(2_000)));
        assert_eq!(claims.get("cid"), Some(json!("tenant-9")));
        assert_eq!(claims.get("missing"), None);
    }

    #[test]
    fn claims_without_roles_claim_have_no_roles() {
        let claims: AccessTokenClaims =
            serde_json::from_value(json!({ "sub": "acct-1" })).unwrap();
        assert!(claims.roles().is_empty());
        assert_eq!(claims.tenant(), None);
    }
}
