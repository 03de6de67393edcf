//! 健康检查

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use super::{AppState, Storage};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub storage: String,
    pub version: String,
    pub timestamp: String,
}

/// 使用数据库时顺带检查连接
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let healthy = match &state.storage {
        Storage::Memory => true,
        #[cfg(feature = "database")]
        Storage::Postgres(db) => match db.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("数据库健康检查失败: {}", e);
                false
            }
        },
    };

    let (code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            storage: state.storage.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}
