//! 服务配置：TOML 文件 + 环境变量覆盖

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 服务配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 考勤配置
    pub attendance: AttendanceConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定地址
    pub bind_address: String,
    /// HTTP 服务端口
    pub port: u16,
    /// 请求超时时间（秒）
    pub timeout_seconds: u64,
    /// 允许的跨域来源，空表示任意
    pub cors_allowed_origins: Vec<String>,
}

/// 数据库配置；url 为空时使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

/// 默认的 JWT 密钥，仅供本地开发使用
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// 令牌有效期（小时）
    pub token_ttl_hours: u32,
    /// 启动时确保存在的管理员账号
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// 考勤作息配置，时间格式 HH:MM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    pub work_start: String,
    pub lunch_start: String,
    pub lunch_end: String,
    pub work_end: String,
    /// 宽限分钟数
    pub grace_minutes: i64,
    /// 考勤所在时区相对 UTC 的分钟偏移
    pub utc_offset_minutes: i32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 指令
    pub level: String,
    /// 日志目录
    pub log_dir: PathBuf,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 是否写入文件
    pub file_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 5,
            acquire_timeout_seconds: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            bootstrap_admin: None,
        }
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            work_start: "09:00".to_string(),
            lunch_start: "12:00".to_string(),
            lunch_end: "13:00".to_string(),
            work_end: "18:00".to_string(),
            grace_minutes: 15,
            utc_offset_minutes: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            file_prefix: "chemsupply".to_string(),
            file_output: true,
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("文件读取错误: {0}")]
    FileRead(String),
    #[error("配置解析错误: {0}")]
    Parse(String),
    #[error("配置验证错误: {0}")]
    Validation(String),
}

pub fn parse_clock_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ConfigError::Validation(format!("无效的时间格式: {}，应为 HH:MM", value)))
}

impl Config {
    /// 从配置文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 环境变量覆盖文件中的敏感配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }
    }

    /// 连接了数据库却仍在使用默认 JWT 密钥
    pub fn uses_default_secret_with_database(&self) -> bool {
        self.auth.jwt_secret == DEFAULT_JWT_SECRET && self.database.url.is_some()
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("HTTP端口必须大于0".to_string()));
        }
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::Validation("绑定地址不能为空".to_string()));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Validation("JWT 密钥不能为空".to_string()));
        }
        if self.auth.token_ttl_hours == 0 {
            return Err(ConfigError::Validation("令牌有效期必须大于0".to_string()));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Validation(
                "最小连接数不能大于最大连接数".to_string(),
            ));
        }

        let attendance = &self.attendance;
        let start = parse_clock_time(&attendance.work_start)?;
        let lunch_start = parse_clock_time(&attendance.lunch_start)?;
        let lunch_end = parse_clock_time(&attendance.lunch_end)?;
        let end = parse_clock_time(&attendance.work_end)?;
        if !(start < lunch_start && lunch_start < lunch_end && lunch_end < end) {
            return Err(ConfigError::Validation(
                "作息时间必须满足 上班 < 午休开始 < 午休结束 < 下班".to_string(),
            ));
        }
        if attendance.grace_minutes < 0 {
            return Err(ConfigError::Validation("宽限分钟数不能为负".to_string()));
        }
        if attendance.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Validation("时区偏移超出范围".to_string()));
        }

        Ok(())
    }
}

/// 从文件或默认值加载配置
///
/// 查找顺序：`APP_CONFIG` 指定的路径、`config.toml`、`./config/config.toml`。
pub fn load_config() -> Result<Config, ConfigError> {
    let mut config = match std::env::var("APP_CONFIG") {
        Ok(path) => {
            info!("从配置文件加载: {}", path);
            Config::load_from_file(path)?
        }
        Err(_) => {
            let config_paths = ["config.toml", "./config/config.toml"];
            match config_paths.iter().find(|path| Path::new(path).exists()) {
                Some(path) => {
                    info!("从配置文件加载: {}", path);
                    Config::load_from_file(path)?
                }
                None => {
                    info!("未找到配置文件，使用默认配置");
                    Config::default()
                }
            }
        }
    };

    config.apply_env_overrides();
    config.validate()?;
    if config.uses_default_secret_with_database() {
        warn!("正在使用默认 JWT 密钥连接数据库，请通过 JWT_SECRET 或 [auth] 配置独立密钥");
    }
    Ok(config)
}
