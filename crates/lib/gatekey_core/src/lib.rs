//! # gatekey_core
//!
//! Credential and session token lifecycle engine: account and profile
//! storage, email/password verification, a single-use token ledger, token
//! pair issuance with rotation, and stateless claim-based authorization.
//!
//! The engine talks to the world through three seams — a per-key-atomic
//! [`store::KeyValueStore`], a [`notify::Notifier`], and a pre-shared
//! symmetric signing secret — and is assembled once per process into an
//! [`AuthStack`].

pub mod accounts;
pub mod authorizer;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod notify;
pub mod password;
pub mod payload;
pub mod profile;
pub mod session;
pub mod store;
pub mod tokens;

use std::sync::Arc;

use crate::accounts::AccountStore;
use crate::authorizer::TokenAuthorizer;
use crate::config::AuthConfig;
use crate::credentials::CredentialService;
use crate::notify::Notifier;
use crate::session::{ClaimsHook, SessionIssuer};
use crate::store::{KeyValueStore, RetryingStore};
use crate::tokens::TokenStore;

/// Process-wide composition of the engine's components.
///
/// Built once at startup and passed by reference to request handlers; no
/// component relies on hidden module-level state. The backing store is
/// wrapped with per-call timeouts and bounded retries here, so individual
/// components stay retry-free.
pub struct AuthStack {
    pub config: AuthConfig,
    pub accounts: Arc<AccountStore>,
    pub tokens: Arc<TokenStore>,
    pub credentials: CredentialService,
    pub sessions: SessionIssuer,
    pub authorizer: TokenAuthorizer,
}

impl AuthStack {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_claims_hook(config, store, notifier, None)
    }

    /// Assemble the stack with an optional claims-enrichment hook.
    pub fn with_claims_hook(
        config: AuthConfig,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        claims_hook: Option<ClaimsHook>,
    ) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(RetryingStore::new(store));

        let accounts = Arc::new(AccountStore::new(
            Arc::clone(&store),
            config.tables.accounts.clone(),
            config.tables.profiles.clone(),
        ));
        let tokens = Arc::new(TokenStore::new(
            Arc::clone(&store),
            config.tables.tokens.clone(),
        ));
        let credentials = CredentialService::new(
            Arc::clone(&store),
            Arc::clone(&accounts),
            Arc::clone(&tokens),
            notifier,
            config.tables.credentials.clone(),
            config.verification_url.clone(),
        );
        let mut sessions = SessionIssuer::new(
            Arc::clone(&accounts),
            Arc::clone(&tokens),
            config.jwt_secret.clone(),
            config.token_life_secs,
        );
        if let Some(hook) = claims_hook {
            sessions = sessions.with_claims_hook(hook);
        }
        let authorizer = TokenAuthorizer::new(config.jwt_secret.clone(), config.super_tenant.clone());

        Self {
            config,
            accounts,
            tokens,
            credentials,
            sessions,
            authorizer,
        }
    }
}

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
