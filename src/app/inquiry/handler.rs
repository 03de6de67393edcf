//! 询价处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::model::*;
use crate::app::AppState;
use crate::core::{
    auth::{AdminUser, AuthUser, MaybeAuthUser},
    ApiResponse, CoreError, Paginated,
};

type JsonResult<T> = Result<Json<ApiResponse<T>>, CoreError>;

pub async fn submit_inquiry(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    Json(payload): Json<SubmitInquiryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Inquiry>>), CoreError> {
    let inquiry = state.inquiry.submit(claims.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(inquiry))))
}

pub async fn list_my_inquiries(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<InquiryQuery>,
) -> JsonResult<Paginated<Inquiry>> {
    let inquiries = state.inquiry.list_mine(&claims, query).await?;
    Ok(Json(ApiResponse::success(inquiries)))
}

pub async fn get_inquiry(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> JsonResult<Inquiry> {
    let inquiry = state.inquiry.get(&claims, id).await?;
    Ok(Json(ApiResponse::success(inquiry)))
}

pub async fn cancel_inquiry(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> JsonResult<Inquiry> {
    let inquiry = state.inquiry.cancel(&claims, id).await?;
    Ok(Json(ApiResponse::success(inquiry)))
}

pub async fn admin_list_inquiries(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<InquiryQuery>,
) -> JsonResult<Paginated<Inquiry>> {
    let inquiries = state.inquiry.list(query).await?;
    Ok(Json(ApiResponse::success(inquiries)))
}

pub async fn admin_get_inquiry(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> JsonResult<Inquiry> {
    let inquiry = state.inquiry.get_any(id).await?;
    Ok(Json(ApiResponse::success(inquiry)))
}

pub async fn update_inquiry_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInquiryStatusRequest>,
) -> JsonResult<Inquiry> {
    let inquiry = state.inquiry.update_status(id, payload).await?;
    Ok(Json(ApiResponse::success(inquiry)))
}
