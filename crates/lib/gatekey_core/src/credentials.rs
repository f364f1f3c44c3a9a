//! Email/password credential management.
//!
//! Owns the credential rows keyed by email and the email-verification flow.
//! Account creation goes through [`AccountStore`]; verification tokens go
//! through [`TokenStore`]; delivery goes through the [`Notifier`] seam and is
//! fire-and-forget — a failed notification never unwinds a created account.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use tracing::{debug, info, warn};

use crate::accounts::{AccountStore, PersonData};
use crate::error::{AuthError, AuthResult};
use crate::models::{EmailPasswordCredential, ProfileRef, TokenType};
use crate::notify::Notifier;
use crate::password;
use crate::store::{Key, KeyValueStore, from_item, to_item};
use crate::tokens::TokenStore;

/// Profile type attached to accounts created through local signup.
pub const PROFILE_TYPE_EMAIL: &str = "email";

/// Result of a successful signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential {
    pub account_id: String,
    /// For local credentials the profile id is the email address.
    pub profile_id: String,
}

/// Email/password credential service.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn KeyValueStore>,
    accounts: Arc<AccountStore>,
    tokens: Arc<TokenStore>,
    notifier: Arc<dyn Notifier>,
    table: String,
    verification_url: String,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        accounts: Arc<AccountStore>,
        tokens: Arc<TokenStore>,
        notifier: Arc<dyn Notifier>,
        table: impl Into<String>,
        verification_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            accounts,
            tokens,
            notifier,
            table: table.into(),
            verification_url: verification_url.into(),
        }
    }

    /// Fetch the credential row for an email, if any.
    pub async fn get_entry(&self, email: &str) -> AuthResult<Option<EmailPasswordCredential>> {
        let item = self.store.get(&self.table, &Key::single(email)).await?;
        item.map(from_item).transpose().map_err(AuthError::from)
    }

    /// Create a local credential and its account.
    ///
    /// Unless `pre_verified` is set, a verification token is minted and
    /// handed to the notifier on a spawned task; the signup result does not
    /// wait on, or fail with, that delivery.
    pub async fn create_entry(
        &self,
        email: &str,
        password: &str,
        pre_verified: bool,
    ) -> AuthResult<NewCredential> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "You must provide a valid email and password".into(),
            ));
        }
        if self.get_entry(email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered".into()));
        }

        let password_hash = password::hash_password(password)?;
        let account = self
            .accounts
            .create_account(
                ProfileRef::new(email, PROFILE_TYPE_EMAIL),
                &PersonData::default(),
            )
            .await?;

        let credential = EmailPasswordCredential {
            email: email.to_string(),
            account_id: account.account_id.clone(),
            password_hash,
            is_verified: pre_verified,
            create_date: Utc::now(),
            verified_date: None,
        };
        self.store
            .put(&self.table, &Key::single(email), to_item(&credential)?)
            .await?;
        info!(email, account_id = %account.account_id, "credential created");

        if !pre_verified {
            let service = self.clone();
            let account_id = account.account_id.clone();
            let email = email.to_string();
            tokio::spawn(async move {
                if let Err(err) = service.send_verification(&account_id, &email).await {
                    warn!(error = %err, email, "verification notification failed");
                }
            });
        }

        Ok(NewCredential {
            account_id: account.account_id,
            profile_id: email.to_string(),
        })
    }

    /// Check an email/password pair, returning the account id on success.
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn verify_password(&self, email: &str, password: &str) -> AuthResult<String> {
        debug!(email, "checking password");
        let Some(entry) = self.get_entry(email).await? else {
            return Err(AuthError::Unauthorized("Invalid credentials".into()));
        };
        if !password::verify_password(password, &entry.password_hash)? {
            debug!(email, "password mismatch");
            return Err(AuthError::Unauthorized("Invalid credentials".into()));
        }
        Ok(entry.account_id)
    }

    /// Mint a verification token for an account and hand it to the notifier.
    /// Returns the token (also embedded in the notification parameters).
    pub async fn send_verification(&self, account_id: &str, email: &str) -> AuthResult<String> {
        debug!(email, account_id, "sending email verification");
        let token = TokenStore::generate();
        let mut extra = Map::new();
        extra.insert("email".into(), json!(email));
        self.tokens
            .insert(&token, TokenType::EmailVerification, Some(account_id), extra)
            .await?;

        let params = json!({
            "email": email,
            "code": token,
            "verificationUrl": format!("{}?code={}", self.verification_url, token),
        });
        self.notifier
            .send(email, params)
            .await
            .map_err(|e| AuthError::Server(e.to_string()))?;
        Ok(token)
    }

    /// Redeem a verification token: marks the credential verified and
    /// consumes the token. The same generic error covers unknown, already
    /// used and email-less tokens.
    pub async fn activate_with_token(&self, token: &str) -> AuthResult<String> {
        debug!("activating credential with token");
        let record = self
            .tokens
            .consume(token, TokenType::EmailVerification)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid token".into()))?;
        let Some(email) = record.email().map(str::to_string) else {
            return Err(AuthError::Unauthorized("Invalid token".into()));
        };

        let patch = json!({ "isVerified": true, "verifiedDate": Utc::now() });
        let found = self
            .store
            .update(
                &self.table,
                &Key::single(&email),
                patch.as_object().cloned().unwrap_or_default(),
            )
            .await?;
        if !found {
            return Err(AuthError::Unauthorized("Invalid token".into()));
        }
        info!(email, "credential verified");
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::notify::NotifyError;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, address: &str, params: Value) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((address.to_string(), params));
            Ok(())
        }
    }

    struct Fixture {
        service: CredentialService,
        accounts: Arc<AccountStore>,
        tokens: Arc<TokenStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let accounts = Arc::new(AccountStore::new(Arc::clone(&store), "accounts", "profiles"));
        let tokens = Arc::new(TokenStore::new(Arc::clone(&store), "tokens"));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = CredentialService::new(
            store,
            Arc::clone(&accounts),
            Arc::clone(&tokens),
            notifier.clone() as Arc<dyn Notifier>,
            "credentials",
            "http://localhost:3000/verify-email",
        );
        Fixture {
            service,
            accounts,
            tokens,
            notifier,
        }
    }

    async fn wait_for_notification(notifier: &RecordingNotifier) -> (String, Value) {
        for _ in 0..200 {
            if let Some(first) = notifier.sent.lock().unwrap().first().cloned() {
                return first;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no notification arrived");
    }

    #[tokio::test]
    async fn create_then_verify_roundtrips() {
        let fx = fixture();
        let created = fx
            .service
            .create_entry("a@b.com", "pw1", true)
            .await
            .unwrap();
        assert_eq!(created.profile_id, "a@b.com");

        let account_id = fx.service.verify_password("a@b.com", "pw1").await.unwrap();
        assert_eq!(account_id, created.account_id);

        // The account row exists too.
        let account = fx
            .accounts
            .get_account(&created.account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.profiles[0].profile_id, "a@b.com");
        assert_eq!(account.profiles[0].profile_type, PROFILE_TYPE_EMAIL);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_leaves_credential_unchanged() {
        let fx = fixture();
        let first = fx
            .service
            .create_entry("a@b.com", "pw1", true)
            .await
            .unwrap();

        let err = fx
            .service
            .create_entry("a@b.com", "pw2", true)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        // The first credential still verifies with the first password.
        let account_id = fx.service.verify_password("a@b.com", "pw1").await.unwrap();
        assert_eq!(account_id, first.account_id);
        assert!(
            fx.service
                .verify_password("a@b.com", "pw2")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn empty_email_or_password_is_rejected() {
        let fx = fixture();
        for (email, password) in [("", "pw"), ("  ", "pw"), ("a@b.com", "")] {
            let err = fx
                .service
                .create_entry(email, password, true)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_fail_the_same_way() {
        let fx = fixture();
        fx.service
            .create_entry("a@b.com", "pw1", true)
            .await
            .unwrap();

        let wrong = fx
            .service
            .verify_password("a@b.com", "nope")
            .await
            .unwrap_err();
        let missing = fx
            .service
            .verify_password("ghost@b.com", "pw1")
            .await
            .unwrap_err();
        assert_eq!(wrong.to_string(), missing.to_string());
        assert!(matches!(wrong, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn signup_triggers_verification_notification() {
        let fx = fixture();
        let created = fx
            .service
            .create_entry("a@b.com", "pw1", false)
            .await
            .unwrap();

        let (address, params) = wait_for_notification(&fx.notifier).await;
        assert_eq!(address, "a@b.com");
        let code = params["code"].as_str().unwrap().to_string();
        assert!(
            params["verificationUrl"]
                .as_str()
                .unwrap()
                .ends_with(&format!("?code={code}"))
        );

        // The minted token is in the ledger, bound to the new account.
        assert!(
            fx.tokens
                .is_valid_token(
                    &code,
                    Some(&created.account_id),
                    TokenType::EmailVerification
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn pre_verified_signup_sends_nothing() {
        let fx = fixture();
        fx.service
            .create_entry("a@b.com", "pw1", true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fx.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn activation_marks_verified_and_consumes_the_token() {
        let fx = fixture();
        let created = fx
            .service
            .create_entry("a@b.com", "pw1", true)
            .await
            .unwrap();
        let token = fx
            .service
            .send_verification(&created.account_id, "a@b.com")
            .await
            .unwrap();

        let email = fx.service.activate_with_token(&token).await.unwrap();
        assert_eq!(email, "a@b.com");

        let entry = fx.service.get_entry("a@b.com").await.unwrap().unwrap();
        assert!(entry.is_verified);
        assert!(entry.verified_date.is_some());

        // Single-use: redeeming again fails.
        let err = fx.service.activate_with_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_activation_token_mutates_nothing() {
        let fx = fixture();
        fx.service
            .create_entry("a@b.com", "pw1", false)
            .await
            .unwrap();

        let err = fx
            .service
            .activate_with_token("not-a-real-token")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));

        let entry = fx.service.get_entry("a@b.com").await.unwrap().unwrap();
        assert!(!entry.is_verified);
        assert!(entry.verified_date.is_none());
    }
}
