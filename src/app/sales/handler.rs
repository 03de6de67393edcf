//! 销售单据处理器

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

pub async fn list_records(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<CleanQuery>,
) -> JsonResult<Paginated<CleanRecord>> {
    let records = state.sales.list(query).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn create_record(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<RawSalesRecord>,
) -> Result<(StatusCode, Json<ApiResponse<CleanRecord>>), CoreError> {
    let record = state.sales.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn import_records(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<ImportRequest>,
) -> JsonResult<ImportResult> {
    let result = state.sales.import(payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn summary(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<SummaryQuery>,
) -> JsonResult<SalesSummary> {
    let summary = state.sales.summary(query).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn delete_record(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.sales.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
