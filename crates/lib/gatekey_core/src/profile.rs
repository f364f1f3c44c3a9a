//! Provider profile normalization.
//!
//! Each supported provider has its own payload shape and its own
//! normalization function; unknown providers are rejected outright instead
//! of probing fields. Normalization is pure — no store access, no clock.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;
use crate::models::ProfileRef;

/// Supported social login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Facebook,
    Google,
}

impl Provider {
    /// Storage/wire name, used as the `profileType` of mappings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "facebook" => Some(Provider::Facebook),
            "google" => Some(Provider::Google),
            _ => None,
        }
    }
}

/// Provider-independent profile produced by [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProfile {
    pub profile_id: String,
    pub provider: Provider,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
}

impl CanonicalProfile {
    pub fn profile_ref(&self) -> ProfileRef {
        ProfileRef::new(&self.profile_id, self.provider.as_str())
    }
}

/// Facebook-shaped payload: numeric id plus a combined display name.
#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
}

/// Google-shaped payload: `sub` plus split name fields.
#[derive(Debug, Deserialize)]
struct GoogleProfile {
    sub: String,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
}

/// Map a provider-shaped payload to a [`CanonicalProfile`].
///
/// Fails with `UnsupportedProvider` for provider names this build does not
/// know, and `Validation` when the payload is missing the provider's id
/// field or is otherwise malformed.
pub fn normalize(provider: &str, payload: &Value) -> Result<CanonicalProfile, AuthError> {
    match Provider::parse(provider) {
        Some(Provider::Facebook) => {
            let profile: FacebookProfile = serde_json::from_value(payload.clone())
                .map_err(|_| AuthError::Validation("malformed facebook profile".into()))?;
            let (first_name, last_name) = profile
                .name
                .as_deref()
                .map(split_display_name)
                .unwrap_or((None, None));
            Ok(CanonicalProfile {
                profile_id: profile.id,
                provider: Provider::Facebook,
                first_name,
                last_name,
                name: profile.name,
            })
        }
        Some(Provider::Google) => {
            let profile: GoogleProfile = serde_json::from_value(payload.clone())
                .map_err(|_| AuthError::Validation("malformed google profile".into()))?;
            let (split_first, split_last) = profile
                .name
                .as_deref()
                .map(split_display_name)
                .unwrap_or((None, None));
            Ok(CanonicalProfile {
                profile_id: profile.sub,
                provider: Provider::Google,
                first_name: profile.given_name.or(split_first),
                last_name: profile.family_name.or(split_last),
                name: profile.name,
            })
        }
        None => Err(AuthError::UnsupportedProvider(provider.to_string())),
    }
}

/// Split a combined display name on whitespace: first token → first name;
/// last token → last name only when there are at least two tokens.
fn split_display_name(name: &str) -> (Option<String>, Option<String>) {
    let mut tokens = name.split_whitespace();
    let first = tokens.next().map(str::to_string);
    let last = tokens.next_back().map(str::to_string);
    (first, last)
}
