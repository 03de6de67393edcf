//! 考勤处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::model::*;
use crate::app::AppState;
use crate::core::{
    auth::{AdminUser, AuthUser},
    ApiResponse, CoreError, Paginated,
};

type JsonResult<T> = Result<Json<ApiResponse<T>>, CoreError>;

pub async fn create_time_record(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreateTimeRecordRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TimeRecord>>), CoreError> {
    let record = state.attendance.record(&claims, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn list_time_records(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<TimeRecordQuery>,
) -> JsonResult<Paginated<TimeRecord>> {
    let records = state.attendance.list(&claims, query).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn today_records(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> JsonResult<Vec<TimeRecord>> {
    let records = state.attendance.today_records(&claims).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn today_summary(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> JsonResult<TodaySummary> {
    let summary = state.attendance.today_summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn employee_stats(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> JsonResult<EmployeeStats> {
    let stats = state
        .attendance
        .employee_stats(&claims, user_id, query)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn department_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<StatsQuery>,
) -> JsonResult<Vec<DepartmentStats>> {
    let stats = state.attendance.department_stats(query).await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn delete_time_record(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.attendance.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
