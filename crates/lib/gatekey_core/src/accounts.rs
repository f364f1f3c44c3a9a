//! Account and profile-mapping persistence.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::{Account, ProfileMapping, ProfileRef};
use crate::profile::CanonicalProfile;
use crate::store::{Key, KeyValueStore, from_item, to_item};

/// Optional provider-supplied person fields copied onto a new account.
#[derive(Debug, Clone, Default)]
pub struct PersonData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
}

impl From<&CanonicalProfile> for PersonData {
    fn from(profile: &CanonicalProfile) -> Self {
        Self {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            name: profile.name.clone(),
        }
    }
}

/// Persistence for accounts and third-party profile mappings.
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
    account_table: String,
    profile_table: String,
}

impl AccountStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        account_table: impl Into<String>,
        profile_table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            account_table: account_table.into(),
            profile_table: profile_table.into(),
        }
    }

    /// Generate a fresh account id.
    ///
    /// No uniqueness check is made against the store before first write; the
    /// v4 identifier space is assumed large enough that collisions are not a
    /// practical concern.
    fn new_account_id() -> String {
        let account_id = Uuid::new_v4().to_string();
        info!(account_id, "new account id created");
        account_id
    }

    /// Create and persist an account with one attached profile. Name fields
    /// from `data` are copied when present.
    pub async fn create_account(
        &self,
        profile: ProfileRef,
        data: &PersonData,
    ) -> AuthResult<Account> {
        let account = Account {
            account_id: Self::new_account_id(),
            create_date: Utc::now(),
            is_admin: false,
            profiles: vec![profile],
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            name: data.name.clone(),
        };
        self.store
            .put(
                &self.account_table,
                &Key::single(&account.account_id),
                to_item(&account)?,
            )
            .await?;
        Ok(account)
    }

    pub async fn get_account(&self, account_id: &str) -> AuthResult<Option<Account>> {
        debug!(account_id, "retrieving account");
        let item = self
            .store
            .get(&self.account_table, &Key::single(account_id))
            .await?;
        item.map(from_item).transpose().map_err(AuthError::from)
    }

    /// Look up the account mapped to a (profileId, profileType) pair. The
    /// compound key admits at most one row per pair.
    pub async fn get_profile_mapping(
        &self,
        profile_id: &str,
        profile_type: &str,
    ) -> AuthResult<Option<ProfileMapping>> {
        debug!(profile_id, profile_type, "retrieving profile mapping");
        let item = self
            .store
            .get(
                &self.profile_table,
                &Key::compound(profile_id, profile_type),
            )
            .await?;
        item.map(from_item).transpose().map_err(AuthError::from)
    }

    pub async fn add_profile_mapping(
        &self,
        profile_id: &str,
        profile_type: &str,
        account_id: &str,
    ) -> AuthResult<ProfileMapping> {
        debug!(profile_id, profile_type, account_id, "adding profile mapping");
        let mapping = ProfileMapping {
            profile_id: profile_id.to_string(),
            profile_type: profile_type.to_string(),
            account_id: account_id.to_string(),
            create_date: Utc::now(),
        };
        self.store
            .put(
                &self.profile_table,
                &Key::compound(profile_id, profile_type),
                to_item(&mapping)?,
            )
            .await?;
        Ok(mapping)
    }

    /// Provision an account for a first-time social login: account row, then
    /// the mapping row. Two per-key writes, no transaction.
    pub async fn create_account_with_profile(
        &self,
        profile: &CanonicalProfile,
    ) -> AuthResult<Account> {
        let account = self
            .create_account(profile.profile_ref(), &PersonData::from(profile))
            .await?;
        self.add_profile_mapping(
            &profile.profile_id,
            profile.provider.as_str(),
            &account.account_id,
        )
        .await?;
        Ok(account)
    }
}
