//! Boundary payload parsing.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AuthError;

/// Decode a JSON request body into `T`, mapping malformed input to the
/// `PAYLOAD_PARSE_ERROR` contract kind instead of leaking serde detail.
pub fn parse_payload<T: DeserializeOwned>(body: &str) -> Result<T, AuthError> {
    serde_json::from_str(body).map_err(|err| {
        debug!(error = %err, "payload failed to parse");
        AuthError::PayloadParse("Request not in a valid format (JSON)".into())
    })
}
