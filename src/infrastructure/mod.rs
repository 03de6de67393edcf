//! 基础设施：日志、数据库、内存存储

#[cfg(feature = "database")]
pub mod database;
pub mod logger;
pub mod memory;
