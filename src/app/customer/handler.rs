//! 客户档案处理器

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

pub async fn list_customers(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<CustomerQuery>,
) -> JsonResult<Paginated<Customer>> {
    let customers = state.customer.list(query).await?;
    Ok(Json(ApiResponse::success(customers)))
}

pub async fn get_customer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> JsonResult<Customer> {
    let customer = state.customer.get(id).await?;
    Ok(Json(ApiResponse::success(customer)))
}

pub async fn create_customer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Customer>>), CoreError> {
    let customer = state.customer.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(customer))))
}

pub async fn update_customer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> JsonResult<Customer> {
    let customer = state.customer.update(id, payload).await?;
    Ok(Json(ApiResponse::success(customer)))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.customer.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
