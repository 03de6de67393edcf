//! # chemsupply
//!
//! 化学品供应商城与员工考勤服务：
//! - 产品目录、询价单（购物车）流程与账户管理
//! - 管理后台：产品库存、用户、客户档案与销售单据
//! - 员工打卡、准时判定与出勤统计
//!
//! 配置了 `database.url` 时使用 PostgreSQL，否则使用内存存储。

pub mod app;
pub mod config;
pub mod core;
pub mod infrastructure;
pub mod utils;

use anyhow::Context;
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

pub use app::{build_router, create_routes, AppState, Repositories, Storage};
pub use config::Config;

use crate::app::attendance::model::WorkSchedule;
use crate::core::auth::JwtKeys;

/// 根据配置选择存储后端并组装应用状态
pub async fn build_state(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<AppState> {
    let schedule = WorkSchedule::from_config(&config.attendance)?;
    let keys = JwtKeys::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);
    let (repos, storage) = open_storage(config).await?;

    let state = AppState::new(repos, storage, keys, schedule, clock);
    if let Some(admin) = &config.auth.bootstrap_admin {
        state
            .account
            .ensure_admin(admin)
            .await
            .context("创建初始管理员失败")?;
    }
    Ok(state)
}

#[cfg(feature = "database")]
async fn open_storage(config: &Config) -> anyhow::Result<(Repositories, Storage)> {
    use infrastructure::database::DatabaseManager;

    match &config.database.url {
        Some(url) => {
            let db = DatabaseManager::new(url, &config.database)
                .await
                .context("连接数据库失败")?;
            db.create_tables().await.context("创建数据库表失败")?;
            let repos = Repositories::postgres(db.get_pool());
            Ok((repos, Storage::Postgres(db)))
        }
        None => {
            info!("未配置数据库，使用内存存储");
            Ok((Repositories::memory(), Storage::Memory))
        }
    }
}

#[cfg(not(feature = "database"))]
async fn open_storage(config: &Config) -> anyhow::Result<(Repositories, Storage)> {
    if config.database.url.is_some() {
        tracing::warn!("未启用 database 特性，忽略数据库配置");
    }
    info!("使用内存存储");
    Ok((Repositories::memory(), Storage::Memory))
}
