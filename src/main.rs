use anyhow::Context;
use chemsupply::{build_router, build_state, config::load_config, infrastructure::logger::Logger};
use mockable::DefaultClock;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _guard = Logger::init(&config.logging)?;

    info!("启动 chemsupply 服务...");
    let state = build_state(&config, Arc::new(DefaultClock)).await?;
    info!("存储后端: {}", state.storage.name());

    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法绑定到 {}", addr))?;
    info!("🚀 服务运行在 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
    }
    info!("收到退出信号，正在关闭...");
}
