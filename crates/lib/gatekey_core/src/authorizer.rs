//! Stateless access-token authorization.
//!
//! Operates purely on signed claims — no store access. Decode failures are
//! deliberately indistinguishable: malformed structure, a bad signature and
//! a wrong algorithm all surface as the same `Invalid token` so callers
//! cannot probe which check failed. Expiry is checked by hand against
//! epoch-millisecond claims, outside the JWT library's second-based
//! validation.

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::models::AccessTokenClaims;

/// Role that passes every role check.
pub const ROLE_ADMIN: &str = "admin";

/// Policy document version understood by gateway authorizers.
const POLICY_VERSION: &str = "2012-10-17";

/// The single action these policies grant or deny.
const POLICY_ACTION: &str = "execute-api:Invoke";

/// Verify signature and structure, returning the claims. Expiry is NOT
/// checked here; `exp` carries milliseconds and is gated separately.
pub(crate) fn decode_claims(token: &str, secret: &[u8]) -> AuthResult<AccessTokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|err| {
            debug!(error = %err, "unable to decode token");
            AuthError::Unauthorized("Invalid token".into())
        })
}

/// Allow/deny effect of a policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub action: String,
    pub effect: Effect,
    pub resource: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

/// Gateway-style authorization response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicy {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
}

impl AuthPolicy {
    fn new(principal_id: &str, effect: Effect, resource: &str) -> Self {
        Self {
            principal_id: principal_id.to_string(),
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![PolicyStatement {
                    action: POLICY_ACTION.to_string(),
                    effect,
                    resource: resource.to_string(),
                }],
            },
        }
    }
}

/// Stateless decoder and claim checker for access tokens.
pub struct TokenAuthorizer {
    jwt_secret: String,
    super_tenant: String,
}

impl TokenAuthorizer {
    pub fn new(jwt_secret: impl Into<String>, super_tenant: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            super_tenant: super_tenant.into(),
        }
    }

    /// Verify signature and structure, returning the claims.
    pub fn decode(&self, access_token: &str) -> AuthResult<AccessTokenClaims> {
        decode_claims(access_token, self.jwt_secret.as_bytes())
    }

    fn ensure_fresh(claims: &AccessTokenClaims) -> AuthResult<()> {
        let now = Utc::now().timestamp_millis();
        match claims.exp {
            Some(exp) if exp >= now => Ok(()),
            _ => {
                debug!("token expired");
                Err(AuthError::Unauthorized("Token expired".into()))
            }
        }
    }

    /// Check that a live token carries `role` (or the admin role) and, when
    /// `tenant_id` is non-empty, belongs to that tenant or the super tenant.
    pub fn has_role(&self, access_token: &str, role: &str, tenant_id: &str) -> AuthResult<()> {
        let claims = self.decode(access_token)?;
        Self::ensure_fresh(&claims)?;

        let tenant_ok = tenant_id.is_empty()
            || claims.tenant() == Some(tenant_id)
            || claims.tenant() == Some(self.super_tenant.as_str());
        let role_ok = claims
            .roles()
            .iter()
            .any(|r| *r == role || *r == ROLE_ADMIN);
        debug!(tenant_ok, role_ok, role, "role check");
        if !tenant_ok || !role_ok {
            return Err(AuthError::Unauthorized(
                "Token does not contain the proper role to access resource".into(),
            ));
        }
        Ok(())
    }

    /// Fetch a single claim. Decode failures error; an absent claim is just
    /// `None`. Expiry is not checked.
    pub fn get_claim(&self, access_token: &str, name: &str) -> AuthResult<Option<Value>> {
        let claims = self.decode(access_token)?;
        Ok(claims.get(name))
    }

    /// Build a gateway policy for the token: Deny when it fails to decode or
    /// is expired, Allow otherwise. Never errors. Per-resource rules are not
    /// evaluated.
    pub fn resource_policy(
        &self,
        access_token: &str,
        resource: &str,
        principal_id: &str,
    ) -> AuthPolicy {
        let effect = match self
            .decode(access_token)
            .and_then(|claims| Self::ensure_fresh(&claims))
        {
            Ok(()) => Effect::Allow,
            Err(_) => Effect::Deny,
        };
        AuthPolicy::new(principal_id, effect, resource)
    }
}
