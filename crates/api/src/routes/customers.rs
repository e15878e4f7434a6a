//! Customer registration endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use store::{Address, NewCustomer, Store};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize, Default)]
pub struct AddressRequest {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub number: String,
    pub complement: Option<String>,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Deserialize)]
pub struct RegisterCustomerRequest {
    pub name: String,
    pub email: String,
    /// Credential hash computed at the boundary; the backend stores it
    /// opaquely and never checks credentials itself.
    pub credential_hash: String,
    #[serde(default)]
    pub address: AddressRequest,
    pub phone: Option<String>,
    #[serde(default)]
    pub loyalty_member: bool,
    #[serde(default)]
    pub student: bool,
    #[serde(default)]
    pub local_resident: bool,
}

// -- Response types --

#[derive(Serialize)]
pub struct CustomerRegisteredResponse {
    pub customer_id: String,
}

// -- Handlers --

/// POST /customers — register a new customer.
///
/// A duplicate email is a 409, reported as such rather than as a generic
/// server failure.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerRegisteredResponse>), ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.credential_hash.is_empty()
    {
        return Err(ApiError::BadRequest(
            "name, email and credential are required".to_string(),
        ));
    }

    let customer_id = state
        .store
        .insert_customer(NewCustomer {
            name: req.name,
            email: req.email,
            credential_hash: req.credential_hash,
            address: Address {
                street: req.address.street,
                number: req.address.number,
                complement: req.address.complement,
                postal_code: req.address.postal_code,
                city: req.address.city,
                state: req.address.state,
            },
            phone: req.phone,
            loyalty_member: req.loyalty_member,
            student: req.student,
            local_resident: req.local_resident,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CustomerRegisteredResponse {
            customer_id: customer_id.to_string(),
        }),
    ))
}
