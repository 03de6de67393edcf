//! 账户处理器

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

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), CoreError> {
    let auth = state.account.register(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(auth))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> JsonResult<AuthResponse> {
    let auth = state.account.login(payload).await?;
    Ok(Json(ApiResponse::success(auth)))
}

pub async fn me(State(state): State<AppState>, AuthUser(claims): AuthUser) -> JsonResult<User> {
    let user = state.account.me(&claims).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> JsonResult<User> {
    let user = state.account.update_profile(&claims, payload).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, CoreError> {
    state.account.change_password(&claims, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<UserQuery>,
) -> JsonResult<Paginated<User>> {
    let users = state.account.list_users(query).await?;
    Ok(Json(ApiResponse::success(users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> JsonResult<User> {
    let user = state.account.get_user(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), CoreError> {
    let user = state.account.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> JsonResult<User> {
    let user = state.account.update_user(id, payload).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.account.delete_user(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
