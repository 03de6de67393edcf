//! 核心错误处理模块

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// 核心错误类型
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("请求错误: {0}")]
    BadRequest(String),
    #[error("参数校验失败: {0}")]
    Validation(String),
    #[error("未认证")]
    Unauthorized,
    #[error("权限不足")]
    Forbidden,
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error("资源冲突: {0}")]
    Conflict(String),
    #[error("内部错误: {0}")]
    InternalServerError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// 错误响应结构
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub code: u16,
    pub timestamp: String,
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::BadRequest(_) | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, user_message) = match self {
            CoreError::BadRequest(msg) => ("BAD_REQUEST", msg),
            CoreError::Validation(msg) => ("VALIDATION_ERROR", msg),
            CoreError::Unauthorized => (
                "UNAUTHORIZED",
                "认证失败，请提供有效的认证信息".to_string(),
            ),
            CoreError::Forbidden => ("FORBIDDEN", "权限不足，无法访问此资源".to_string()),
            CoreError::NotFound(msg) => ("NOT_FOUND", msg),
            CoreError::Conflict(msg) => ("CONFLICT", msg),
            CoreError::InternalServerError(msg) => {
                // 内部细节只写日志，不返回给客户端
                error!("内部错误: {}", msg);
                ("INTERNAL_SERVER_ERROR", "服务器内部错误".to_string())
            }
        };

        let error_response = ErrorResponse {
            success: false,
            error: error_message.to_string(),
            message: user_message,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    error
                        .message
                        .as_ref()
                        .map(|msg| msg.to_string())
                        .unwrap_or_else(|| format!("{} 字段无效", field))
                })
            })
            .collect();
        messages.sort();

        CoreError::Validation(messages.join(", "))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("记录不存在".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23505") => {
                CoreError::Conflict("记录已存在".to_string())
            }
            other => CoreError::InternalServerError(format!("数据库错误: {}", other)),
        }
    }
}
