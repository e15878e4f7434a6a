//! Product catalog endpoints.
//!
//! Reads are public; every mutation and the stock report are staff-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{NewProduct, ProductRecord, Store};

use crate::AppState;
use crate::auth::{authenticate, require_staff};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub locally_made: bool,
    #[serde(default)]
    pub image_path: String,
}

impl ProductRequest {
    fn into_new_product(self) -> Result<NewProduct, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("product name is required".to_string()));
        }
        if self.price_cents < 0 {
            return Err(ApiError::BadRequest(
                "price must not be negative".to_string(),
            ));
        }
        Ok(NewProduct {
            name: self.name,
            description: self.description,
            unit_price: Money::from_cents(self.price_cents),
            stock_quantity: self.stock_quantity,
            category: self.category,
            locally_made: self.locally_made,
            image_path: self.image_path,
        })
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    pub category: String,
    pub locally_made: bool,
    pub image_path: String,
}

impl From<ProductRecord> for ProductResponse {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.name,
            description: record.description,
            price_cents: record.unit_price.cents(),
            stock_quantity: record.stock_quantity,
            category: record.category,
            locally_made: record.locally_made,
            image_path: record.image_path,
        }
    }
}

#[derive(Serialize)]
pub struct ProductCreatedResponse {
    pub product_id: String,
}

#[derive(Serialize)]
pub struct StockReportResponse {
    pub distinct_products: u64,
    pub total_value_cents: i64,
}

// -- Handlers --

/// GET /products — list the catalog, ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.store.list_products().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// GET /products/{id} — fetch one product.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let product = state
        .store
        .get_product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {id} not found")))?;
    Ok(Json(product.into()))
}

/// GET /products/search?name= — case-insensitive name search.
#[tracing::instrument(skip(state, params))]
pub async fn search<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let name = params
        .name
        .ok_or_else(|| ApiError::BadRequest("query parameter 'name' is required".to_string()))?;
    let products = state.store.search_products(&name).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// POST /products — create a product (staff only).
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductCreatedResponse>), ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;
    require_staff(&identity)?;

    let product_id = state.store.insert_product(req.into_new_product()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(ProductCreatedResponse {
            product_id: product_id.to_string(),
        }),
    ))
}

/// PUT /products/{id} — replace a product (staff only).
#[tracing::instrument(skip(state, headers, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ProductRequest>,
) -> Result<StatusCode, ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;
    require_staff(&identity)?;

    let product_id = parse_product_id(&id)?;
    state
        .store
        .update_product(product_id, req.into_new_product()?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /products/{id} — remove a product (staff only).
#[tracing::instrument(skip(state, headers))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;
    require_staff(&identity)?;

    let product_id = parse_product_id(&id)?;
    state.store.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/report — stock valuation report (staff only).
#[tracing::instrument(skip(state, headers))]
pub async fn report<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<StockReportResponse>, ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;
    require_staff(&identity)?;

    let report = state.store.stock_report().await?;
    Ok(Json(StockReportResponse {
        distinct_products: report.distinct_products,
        total_value_cents: report.total_value.cents(),
    }))
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid product id: {e}")))?;
    Ok(ProductId::from_uuid(uuid))
}
