//! Caller identity extractor.
//!
//! Authentication happens upstream. The proxy in front of the gateway
//! asserts the caller's organization and user through trusted headers, and
//! [`AuthUser`] reads them back.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use agora_core::{OrganizationId, UserId};

use crate::error::ApiError;

/// Header carrying the caller's organization.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

/// The caller, as asserted by the upstream proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// The organization the request acts on.
    pub organization_id: OrganizationId,
    /// The calling user.
    pub user_id: UserId,
}

impl AuthUser {
    /// Read the identity headers.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if a header is missing or malformed.
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        Ok(Self {
            organization_id: header(parts, ORGANIZATION_HEADER)?,
            user_id: header(parts, USER_HEADER)?,
        })
    }
}

fn header<T: std::str::FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(ApiError::Unauthorized)
}

#[axum::async_trait]
impl<St: Send + Sync> FromRequestParts<St> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, String)]) -> Parts {
        let mut builder = Request::builder().uri("/v1/ws");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let org = OrganizationId::generate();
        let user = UserId::generate();
        let mut parts = parts(&[
            (ORGANIZATION_HEADER, org.to_string()),
            (USER_HEADER, user.to_string()),
        ]);

        let caller = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.organization_id, org);
        assert_eq!(caller.user_id, user);
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let mut parts = parts(&[(ORGANIZATION_HEADER, OrganizationId::generate().to_string())]);
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn malformed_id_is_unauthorized() {
        let parts = parts(&[
            (ORGANIZATION_HEADER, "acme".to_string()),
            (USER_HEADER, UserId::generate().to_string()),
        ]);
        assert!(matches!(
            AuthUser::from_parts(&parts),
            Err(ApiError::Unauthorized)
        ));
    }
}
