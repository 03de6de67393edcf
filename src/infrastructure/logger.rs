//! 日志基础设施

use anyhow::Result;
use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// 控制台始终输出；启用文件输出时按日期分割写入 `log_dir`。
    /// `RUST_LOG` 优先于配置中的级别。返回的 guard 需要保持到进程结束。
    pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))?;

        if !config.file_output {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
                .try_init()?;
            return Ok(None);
        }

        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
        let (non_blocking, guard) = non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false) // 文件中不使用颜色
                    .with_target(false)
                    .with_thread_names(true),
            )
            .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
            .try_init()?;

        Ok(Some(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_file_output_then_reinit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            log_dir: dir.path().join("logs"),
            file_prefix: "test".to_string(),
            file_output: true,
        };
        let guard = Logger::init(&config).unwrap();
        assert!(guard.is_some());
        assert!(config.log_dir.is_dir());

        // 全局订阅者只能设置一次
        let console_only = LoggingConfig {
            file_output: false,
            ..config.clone()
        };
        assert!(Logger::init(&console_only).is_err());
    }
}
