//! Engine configuration.

use std::path::PathBuf;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

/// Access-token lifetime when `TOKEN_LIFESPAN_SECONDS` is unset: 1 hour.
const DEFAULT_TOKEN_LIFE_SECS: i64 = 60 * 60;

/// Tenant sentinel that passes every tenant check when `SUPER_TENANT` is
/// unset.
const DEFAULT_SUPER_TENANT: &str = "*";

/// Names of the logical store tables.
#[derive(Debug, Clone)]
pub struct TableNames {
    pub accounts: String,
    pub profiles: String,
    pub credentials: String,
    pub tokens: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            accounts: "accounts".into(),
            profiles: "profiles".into(),
            credentials: "credentials".into(),
            tokens: "tokens".into(),
        }
    }
}

/// Configuration for the credential/token engine.
///
/// Built once at process start and passed by reference; there is no hidden
/// module-level state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Symmetric secret for access-token signing/verification.
    pub jwt_secret: String,
    /// Access-token lifetime in seconds; also reported as `expires_in`.
    pub token_life_secs: i64,
    /// Tenant id that passes every tenant check.
    pub super_tenant: String,
    /// Base URL embedded in verification notifications (`?code=` appended).
    pub verification_url: String,
    /// Logical table names in the backing store.
    pub tables: TableNames,
}

impl AuthConfig {
    /// Reads configuration from environment variables with local-use
    /// defaults.
    ///
    /// | Variable                    | Default                              |
    /// |-----------------------------|--------------------------------------|
    /// | `JWT_SECRET` / `AUTH_SECRET`| generated & persisted to file        |
    /// | `TOKEN_LIFESPAN_SECONDS`    | `3600`                               |
    /// | `SUPER_TENANT`              | `*`                                  |
    /// | `EMAIL_VERIFICATION_URL`    | `http://localhost:3000/verify-email` |
    /// | `TBL_ACCOUNT`               | `accounts`                           |
    /// | `TBL_PROFILE`               | `profiles`                           |
    /// | `TBL_EMAIL_PASSWORD`        | `credentials`                        |
    /// | `TBL_TOKEN`                 | `tokens`                             |
    pub fn from_env() -> Self {
        Self {
            jwt_secret: resolve_jwt_secret(),
            token_life_secs: std::env::var("TOKEN_LIFESPAN_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOKEN_LIFE_SECS),
            super_tenant: std::env::var("SUPER_TENANT")
                .unwrap_or_else(|_| DEFAULT_SUPER_TENANT.into()),
            verification_url: std::env::var("EMAIL_VERIFICATION_URL")
                .unwrap_or_else(|_| "http://localhost:3000/verify-email".into()),
            tables: TableNames {
                accounts: std::env::var("TBL_ACCOUNT").unwrap_or_else(|_| "accounts".into()),
                profiles: std::env::var("TBL_PROFILE").unwrap_or_else(|_| "profiles".into()),
                credentials: std::env::var("TBL_EMAIL_PASSWORD")
                    .unwrap_or_else(|_| "credentials".into()),
                tokens: std::env::var("TBL_TOKEN").unwrap_or_else(|_| "tokens".into()),
            },
        }
    }

    /// Config with an explicit secret, defaults elsewhere. Intended for
    /// embedding and tests.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_life_secs: DEFAULT_TOKEN_LIFE_SECS,
            super_tenant: DEFAULT_SUPER_TENANT.into(),
            verification_url: "http://localhost:3000/verify-email".into(),
            tables: TableNames::default(),
        }
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted
/// file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    // Generate and persist so restarts do not invalidate issued tokens.
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gatekey")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_secret_uses_defaults() {
        let config = AuthConfig::with_secret("s3cret");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.token_life_secs, 3600);
        assert_eq!(config.super_tenant, "*");
        assert_eq!(config.tables.tokens, "tokens");
        assert_eq!(config.tables.credentials, "credentials");
    }
}
