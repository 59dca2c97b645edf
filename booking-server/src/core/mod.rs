//! 核心模块 - 配置、时钟、状态和后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 服务配置 (环境变量)
//! - [`Clock`] - 可注入时钟
//! - [`BookingState`] - 组件装配
//! - [`BackgroundTasks`] / [`MaintenanceScheduler`] - 后台任务

pub mod clock;
pub mod config;
pub mod scheduler;
pub mod state;
pub mod tasks;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Config, LunchBreak, PricingConfig, ReminderConfig, SchedulerConfig, SlotGenerationConfig,
    WorkHours, WorkSchedule,
};
pub use scheduler::MaintenanceScheduler;
pub use state::BookingState;
pub use tasks::{BackgroundTasks, TaskKind};
