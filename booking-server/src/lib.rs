//! Booking Server - 旅行社预约时段与订单子系统
//!
//! # 架构概述
//!
//! - **时段** (`slots`): 按工作时间生成时段, 时段管理
//! - **预约** (`booking`): 容量检查 + 预约, 取消, 提醒
//! - **计价** (`pricing`): 服务 / 目的地 / 子服务 / 时效 / 预约费
//! - **订单** (`orders`): 下单、支付对账、订单状态机
//! - **存储** (`storage`): 嵌入式 redb, 单写事务保证原子性
//!
//! # 模块结构
//!
//! ```text
//! booking-server/src/
//! ├── core/          # 配置、时钟、状态、后台任务
//! ├── storage/       # redb 存储层
//! ├── slots/         # SlotGenerator, SlotAdmin
//! ├── booking/       # BookingEngine, 提醒
//! ├── pricing/       # PricingCalculator, 价格目录
//! ├── orders/        # OrderManager, OrderStatusMachine
//! ├── payment/       # 支付网关接口
//! ├── notify/        # 通知接口
//! └── utils/         # 日志
//! ```

pub mod booking;
pub mod core;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod pricing;
pub mod slots;
pub mod storage;
pub mod utils;

// Re-export 公共类型
pub use booking::{BookingEngine, BookingError, BookingRequest, BookingResult};
pub use self::core::{BackgroundTasks, BookingState, Clock, Config, FixedClock, SystemClock};
pub use notify::{LogNotificationSink, MemoryNotificationSink, NotificationSink, Notifier};
pub use orders::{CheckoutRequest, OrderError, OrderManager, OrderStatusMachine};
pub use payment::{MockPaymentProvider, PaymentProvider};
pub use pricing::{PriceQuote, PriceRequest, PricingCalculator, PricingCatalog};
pub use slots::{SlotAdmin, SlotError, SlotGenerator};
pub use storage::BookingStorage;

pub use shared::{AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境: 加载 .env, 初始化日志
///
/// 返回加载后的配置。
pub fn setup_environment() -> Config {
    if let Err(e) = dotenv::dotenv() {
        // .env 可选
        eprintln!("No .env loaded: {e}");
    }
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    config
}
