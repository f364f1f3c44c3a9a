//! Domain models.
//!
//! These are the records persisted in the backing store plus the claim bundle
//! carried inside access tokens. Stored documents use camelCase field names.

pub mod account;
pub mod token;

pub use account::{Account, EmailPasswordCredential, ProfileMapping, ProfileRef};
pub use token::{AccessTokenClaims, TokenPair, TokenRecord, TokenType};
