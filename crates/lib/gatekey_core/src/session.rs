//! Access/refresh token-pair issuance and rotation.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::accounts::AccountStore;
use crate::authorizer::decode_claims;
use crate::error::{AuthError, AuthResult};
use crate::models::{AccessTokenClaims, Account, TokenPair, TokenType};
use crate::profile;
use crate::tokens::TokenStore;

/// Synchronous claims-enrichment hook, called once per issuance with the
/// base claims and the account. Must be side-effect-free: a failure inside
/// it cannot be attributed cleanly to the issuance that triggered it.
pub type ClaimsHook = Box<dyn Fn(AccessTokenClaims, &Account) -> AccessTokenClaims + Send + Sync>;

/// Issues and rotates token pairs for accounts.
pub struct SessionIssuer {
    accounts: Arc<AccountStore>,
    tokens: Arc<TokenStore>,
    jwt_secret: String,
    token_life_secs: i64,
    claims_hook: Option<ClaimsHook>,
}

impl SessionIssuer {
    pub fn new(
        accounts: Arc<AccountStore>,
        tokens: Arc<TokenStore>,
        jwt_secret: impl Into<String>,
        token_life_secs: i64,
    ) -> Self {
        Self {
            accounts,
            tokens,
            jwt_secret: jwt_secret.into(),
            token_life_secs,
            claims_hook: None,
        }
    }

    /// Attach a claims-enrichment hook (roles, tenant id, custom fields).
    pub fn with_claims_hook(mut self, hook: ClaimsHook) -> Self {
        self.claims_hook = Some(hook);
        self
    }

    /// Issue a fresh pair for an account, expiring `old_refresh` when given.
    ///
    /// Old-token expiry is best-effort: a failure is logged and issuance
    /// proceeds. Single-use enforcement for rotation does not depend on it —
    /// the refresh path consumes the old token before ever reaching here.
    pub async fn issue_for_account(
        &self,
        account_id: &str,
        old_refresh: Option<&str>,
    ) -> AuthResult<TokenPair> {
        debug!(account_id, "issuing tokens");
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".into()))?;
        self.issue(&account, old_refresh).await
    }

    async fn issue(&self, account: &Account, old_refresh: Option<&str>) -> AuthResult<TokenPair> {
        if let Err(err) = self.tokens.expire(old_refresh, TokenType::Refresh).await {
            warn!(error = %err, account_id = %account.account_id, "failed to expire previous refresh token");
        }

        let refresh_token = TokenStore::generate();
        self.tokens
            .insert(
                &refresh_token,
                TokenType::Refresh,
                Some(&account.account_id),
                Map::new(),
            )
            .await?;

        let now = Utc::now().timestamp_millis();
        let claims = AccessTokenClaims {
            sub: account.account_id.clone(),
            iat: Some(now),
            exp: Some(now + self.token_life_secs * 1000),
            extra: Map::new(),
        };
        let claims = match &self.claims_hook {
            Some(hook) => hook(claims, account),
            None => claims,
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Server(format!("jwt encode: {e}")))?;

        info!(account_id = %account.account_id, "token pair issued");
        Ok(TokenPair {
            token_type: "bearer".into(),
            access_token,
            expires_in: self.token_life_secs,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// atomically consumed first, so it can win at most once — a concurrent
    /// or replayed exchange of the same token is rejected.
    pub async fn issue_from_refresh_token(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let record = self
            .tokens
            .consume(refresh_token, TokenType::Refresh)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid refresh token".into()))?;
        let account_id = record
            .account_id
            .ok_or_else(|| AuthError::Unauthorized("Invalid refresh token".into()))?;
        self.issue_for_account(&account_id, None).await
    }

    /// Social login: normalize the provider payload, resolve or provision
    /// the account, then issue a pair. Unifies social and local login at the
    /// issuance boundary.
    pub async fn issue_from_profile(
        &self,
        provider: &str,
        payload: &Value,
    ) -> AuthResult<TokenPair> {
        let canonical = profile::normalize(provider, payload)?;
        debug!(
            provider = canonical.provider.as_str(),
            profile_id = %canonical.profile_id,
            "issuing tokens from profile"
        );

        let mapping = self
            .accounts
            .get_profile_mapping(&canonical.profile_id, canonical.provider.as_str())
            .await?;
        let account = match mapping {
            Some(mapping) => self
                .accounts
                .get_account(&mapping.account_id)
                .await?
                .ok_or_else(|| AuthError::NotFound("Account not found".into()))?,
            None => self.accounts.create_account_with_profile(&canonical).await?,
        };
        self.issue(&account, None).await
    }

    /// Expire every refresh token the account holds.
    pub async fn logout(&self, account_id: &str) -> AuthResult<()> {
        self.tokens.expire_all_for_account(account_id).await
    }

    /// Logout addressed by a signed access token instead of an account id.
    pub async fn logout_with_token(&self, access_token: &str) -> AuthResult<()> {
        let claims = decode_claims(access_token, self.jwt_secret.as_bytes())?;
        if claims.sub.is_empty() {
            return Err(AuthError::Unauthorized("Invalid token".into()));
        }
        self.logout(&claims.sub).await
    }
}
