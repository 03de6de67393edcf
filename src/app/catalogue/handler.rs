//! 产品目录处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::model::*;
use crate::app::AppState;
use crate::core::{auth::AdminUser, ApiResponse, CoreError, Paginated};

type JsonResult<T> = Result<Json<ApiResponse<T>>, CoreError>;

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> JsonResult<Paginated<Product>> {
    let products = state.catalogue.list_products(query).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn list_categories(State(state): State<AppState>) -> JsonResult<Vec<String>> {
    let categories = state.catalogue.categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> JsonResult<Product> {
    let product = state.catalogue.get_product(id, false).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn admin_list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ProductQuery>,
) -> JsonResult<Paginated<Product>> {
    let products = state.catalogue.list_all_products(query).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn admin_get_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> JsonResult<Product> {
    let product = state.catalogue.get_product(id, true).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn low_stock(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ProductQuery>,
) -> JsonResult<Paginated<Product>> {
    let products = state.catalogue.low_stock(query).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), CoreError> {
    let product = state.catalogue.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> JsonResult<Product> {
    let product = state.catalogue.update_product(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> JsonResult<Product> {
    let product = state.catalogue.adjust_stock(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.catalogue.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
