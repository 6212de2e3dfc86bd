//! HTTP request handlers.

pub mod agents;
pub mod health;
pub mod rooms;
pub mod workflows;
pub mod ws;

use std::str::FromStr;

use crate::error::ApiError;

/// Parse an id taken from the request path.
pub(crate) fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {kind} ID: {raw}")))
}
