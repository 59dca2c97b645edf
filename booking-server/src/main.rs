use std::sync::Arc;

use booking_server::{BookingState, MockPaymentProvider, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境 (dotenv, 日志) 与配置
    let config = setup_environment();
    tracing::info!(
        work_dir = %config.work_dir,
        timezone = %config.timezone,
        "Booking server starting..."
    );

    // 2. 初始化状态
    tracing::warn!("No payment gateway configured, using the mock provider");
    let state = BookingState::initialize(&config, Arc::new(MockPaymentProvider::new()))?;

    // 3. 后台任务
    let tasks = state.start_background_tasks();

    // 4. 等待 Ctrl+C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    tasks.shutdown().await;

    tracing::info!("Booking server stopped");
    Ok(())
}
