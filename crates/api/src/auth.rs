//! Bearer-token authentication against the account directory.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use common::{CustomerId, StaffId};
use domain::{AccountDirectory, Identity};

use crate::error::ApiError;

/// Resolves the request's bearer token to an identity.
pub async fn authenticate(
    headers: &HeaderMap,
    directory: &dyn AccountDirectory,
) -> Result<Identity, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    directory.resolve(token).await.ok_or(ApiError::Unauthorized)
}

/// Requires a staff identity.
pub fn require_staff(identity: &Identity) -> Result<StaffId, ApiError> {
    match identity {
        Identity::Staff { id } => Ok(*id),
        Identity::Customer { .. } => Err(ApiError::Forbidden(
            "staff access required".to_string(),
        )),
    }
}

/// Requires a customer identity.
pub fn require_customer(identity: &Identity) -> Result<CustomerId, ApiError> {
    match identity {
        Identity::Customer { id, .. } => Ok(*id),
        Identity::Staff { .. } => Err(ApiError::Forbidden(
            "only customers can perform this operation".to_string(),
        )),
    }
}
