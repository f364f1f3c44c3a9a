//! Single-use token ledger.
//!
//! Backs refresh, state and email-verification tokens. Records are keyed by
//! (token, type) and only ever move CREATED → EXPIRED; expiry marks the
//! record rather than deleting it so the account id stays queryable.
//!
//! `lookup` is a pure read — it never rejects on expiry or ownership, callers
//! check those themselves. `consume` is the single-use claim: one conditional
//! write that at most one caller can win, which is what refresh rotation and
//! verification hang replay protection on.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{TryStreamExt, stream};
use rand::{Rng, rng};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};
use crate::models::{TokenRecord, TokenType};
use crate::store::{Key, KeyValueStore, from_item, to_item};

/// Random bytes per generated token (hex-encoded to twice this length).
const DEFAULT_TOKEN_BYTES: usize = 48;

/// Cap on concurrent expiries during account-wide fan-out.
const EXPIRE_CONCURRENCY: usize = 4;

/// Ledger of single-use tokens.
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    table: String,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Generate a cryptographically random token: `size` bytes, hex-encoded.
    pub fn generate_token(size: usize) -> String {
        let mut bytes = vec![0u8; size];
        rng().fill(bytes.as_mut_slice());
        hex::encode(bytes)
    }

    /// Generate a token of the default size (48 bytes).
    pub fn generate() -> String {
        Self::generate_token(DEFAULT_TOKEN_BYTES)
    }

    fn key(token: &str, token_type: TokenType) -> Key {
        Key::compound(token, token_type.as_str())
    }

    /// Persist a new active record. `extra` is merged into the stored
    /// document for type-specific payload.
    pub async fn insert(
        &self,
        token: &str,
        token_type: TokenType,
        account_id: Option<&str>,
        extra: Map<String, Value>,
    ) -> AuthResult<String> {
        debug!(token_type = token_type.as_str(), table = %self.table, "inserting token");
        let record = TokenRecord {
            token: token.to_string(),
            token_type,
            account_id: account_id.map(str::to_string),
            expired: false,
            create_date: Utc::now(),
            extra,
        };
        self.store
            .put(&self.table, &Self::key(token, token_type), to_item(&record)?)
            .await?;
        Ok(record.token)
    }

    /// Pure read of a record. Returns expired records too; callers decide
    /// what expiry and ownership mean for them.
    pub async fn lookup(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> AuthResult<Option<TokenRecord>> {
        let item = self
            .store
            .get(&self.table, &Self::key(token, token_type))
            .await?;
        item.map(from_item).transpose().map_err(AuthError::from)
    }

    /// Mark a record expired. `None` (or an empty token) is a no-op so
    /// callers can pass an optional previous token unconditionally; expiring
    /// an unknown token is also a no-op.
    pub async fn expire(&self, token: Option<&str>, token_type: TokenType) -> AuthResult<()> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            debug!("no token to expire");
            return Ok(());
        };
        let patch = json!({ "expired": true });
        let found = self
            .store
            .update(
                &self.table,
                &Self::key(token, token_type),
                patch.as_object().cloned().unwrap_or_default(),
            )
            .await?;
        if !found {
            debug!(token_type = token_type.as_str(), "expire on unknown token");
        }
        Ok(())
    }

    /// Atomically claim an active record, marking it expired. At most one
    /// concurrent caller gets `Some`; everyone else (and any later replay)
    /// gets `None`.
    pub async fn consume(
        &self,
        token: &str,
        token_type: TokenType,
    ) -> AuthResult<Option<TokenRecord>> {
        let patch = json!({ "expired": true });
        let claimed = self
            .store
            .update_if(
                &self.table,
                &Self::key(token, token_type),
                "expired",
                &Value::Bool(false),
                patch.as_object().cloned().unwrap_or_default(),
            )
            .await?;
        claimed.map(from_item).transpose().map_err(AuthError::from)
    }

    /// Expire every refresh token held by an account, with bounded
    /// concurrency. Partial failure fails the call; records already expired
    /// stay expired — there is no rollback.
    pub async fn expire_all_for_account(&self, account_id: &str) -> AuthResult<()> {
        if account_id.is_empty() {
            return Err(AuthError::Validation(
                "Must provide a valid account ID".into(),
            ));
        }
        let items = self
            .store
            .query_index(&self.table, "accountId", account_id)
            .await?;
        let tokens: Vec<String> = items
            .into_iter()
            .filter_map(|item| from_item::<TokenRecord>(item).ok())
            .filter(|record| record.token_type == TokenType::Refresh && !record.expired)
            .map(|record| record.token)
            .collect();
        info!(account_id, count = tokens.len(), "expiring refresh tokens");
        stream::iter(tokens.into_iter().map(Ok::<_, AuthError>))
            .try_for_each_concurrent(EXPIRE_CONCURRENCY, |token| async move {
                self.expire(Some(&token), TokenType::Refresh).await
            })
            .await
    }

    /// Composite check: record exists, is not expired, and (when given)
    /// belongs to `account_id`.
    pub async fn is_valid_token(
        &self,
        token: &str,
        account_id: Option<&str>,
        token_type: TokenType,
    ) -> AuthResult<bool> {
        let Some(record) = self.lookup(token, token_type).await? else {
            return Ok(false);
        };
        let owner_matches = match account_id {
            Some(expected) => record.account_id.as_deref() == Some(expected),
            None => true,
        };
        Ok(!record.expired && owner_matches)
    }

    /// Mint and persist a state token for redirect-flow forgery protection.
    pub async fn create_state(&self) -> AuthResult<String> {
        let token = Self::generate();
        self.insert(&token, TokenType::State, None, Map::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStore::new()), "tokens")
    }

    #[test]
    fn generated_tokens_are_hex_of_requested_size() {
        let token = TokenStore::generate_token(48);
        assert_eq!(token.len(), 96);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(TokenStore::generate_token(48), token);
        assert_eq!(TokenStore::generate_token(16).len(), 32);
    }

    #[tokio::test]
    async fn insert_then_lookup_roundtrips() {
        let ledger = ledger();
        let mut extra = Map::new();
        extra.insert("email".into(), json!("a@b.com"));
        ledger
            .insert("tok-1", TokenType::EmailVerification, Some("acct-1"), extra)
            .await
            .unwrap();

        let record = ledger
            .lookup("tok-1", TokenType::EmailVerification)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.account_id.as_deref(), Some("acct-1"));
        assert_eq!(record.email(), Some("a@b.com"));
        assert!(!record.expired);

        // Same token under a different type is a different record.
        assert!(
            ledger
                .lookup("tok-1", TokenType::Refresh)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn expire_is_a_noop_for_missing_and_absent_tokens() {
        let ledger = ledger();
        ledger.expire(None, TokenType::Refresh).await.unwrap();
        ledger.expire(Some(""), TokenType::Refresh).await.unwrap();
        ledger
            .expire(Some("never-inserted"), TokenType::Refresh)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_tokens_stay_queryable_but_invalid() {
        let ledger = ledger();
        ledger
            .insert("tok-1", TokenType::Refresh, Some("acct-1"), Map::new())
            .await
            .unwrap();
        ledger
            .expire(Some("tok-1"), TokenType::Refresh)
            .await
            .unwrap();

        let record = ledger
            .lookup("tok-1", TokenType::Refresh)
            .await
            .unwrap()
            .unwrap();
        assert!(record.expired);
        assert!(
            !ledger
                .is_valid_token("tok-1", Some("acct-1"), TokenType::Refresh)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn consume_wins_exactly_once() {
        let ledger = ledger();
        ledger
            .insert("tok-1", TokenType::Refresh, Some("acct-1"), Map::new())
            .await
            .unwrap();

        let first = ledger.consume("tok-1", TokenType::Refresh).await.unwrap();
        assert_eq!(first.unwrap().account_id.as_deref(), Some("acct-1"));

        let second = ledger.consume("tok-1", TokenType::Refresh).await.unwrap();
        assert!(second.is_none());

        assert!(
            ledger
                .consume("unknown", TokenType::Refresh)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn validity_checks_ownership_and_type() {
        let ledger = ledger();
        ledger
            .insert("tok-1", TokenType::Refresh, Some("acct-1"), Map::new())
            .await
            .unwrap();

        assert!(
            ledger
                .is_valid_token("tok-1", Some("acct-1"), TokenType::Refresh)
                .await
                .unwrap()
        );
        assert!(
            !ledger
                .is_valid_token("tok-1", Some("acct-2"), TokenType::Refresh)
                .await
                .unwrap()
        );
        assert!(
            ledger
                .is_valid_token("tok-1", None, TokenType::Refresh)
                .await
                .unwrap()
        );
        assert!(
            !ledger
                .is_valid_token("missing", None, TokenType::Refresh)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn state_tokens_validate_without_an_owner() {
        let ledger = ledger();
        let state = ledger.create_state().await.unwrap();
        assert!(
            ledger
                .is_valid_token(&state, None, TokenType::State)
                .await
                .unwrap()
        );
        ledger.expire(Some(&state), TokenType::State).await.unwrap();
        assert!(
            !ledger
                .is_valid_token(&state, None, TokenType::State)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn account_fanout_expires_only_refresh_tokens() {
        let ledger = ledger();
        ledger
            .insert("r1", TokenType::Refresh, Some("acct-1"), Map::new())
            .await
            .unwrap();
        ledger
            .insert("r2", TokenType::Refresh, Some("acct-1"), Map::new())
            .await
            .unwrap();
        ledger
            .insert("r3", TokenType::Refresh, Some("acct-2"), Map::new())
            .await
            .unwrap();
        ledger
            .insert("v1", TokenType::EmailVerification, Some("acct-1"), Map::new())
            .await
            .unwrap();

        ledger.expire_all_for_account("acct-1").await.unwrap();

        for token in ["r1", "r2"] {
            assert!(
                ledger
                    .lookup(token, TokenType::Refresh)
                    .await
                    .unwrap()
                    .unwrap()
                    .expired
            );
        }
        // Another account's refresh token and the verification token survive.
        assert!(
            !ledger
                .lookup("r3", TokenType::Refresh)
                .await
                .unwrap()
                .unwrap()
                .expired
        );
        assert!(
            !ledger
                .lookup("v1", TokenType::EmailVerification)
                .await
                .unwrap()
                .unwrap()
                .expired
        );
    }

    #[tokio::test]
    async fn account_fanout_requires_an_account_id() {
        let err = ledger().expire_all_for_account("").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
