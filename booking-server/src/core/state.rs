use std::sync::Arc;

use super::clock::{Clock, SystemClock};
use super::config::Config;
use super::scheduler::MaintenanceScheduler;
use super::tasks::BackgroundTasks;
use crate::booking::BookingEngine;
use crate::notify::{LogNotificationSink, NotificationSink, Notifier};
use crate::orders::OrderManager;
use crate::payment::PaymentProvider;
use crate::pricing::{PricingCalculator, PricingCatalog};
use crate::slots::{SlotAdmin, SlotGenerator};
use crate::storage::{BookingStorage, StorageResult};

/// 服务状态 - 持有所有组件的共享引用
///
/// 所有字段都是浅拷贝 (内部 Arc), clone 成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置 (不可变) |
/// | storage | redb 存储 |
/// | clock | 时钟 |
/// | generator | 时段生成 |
/// | slot_admin | 时段管理 |
/// | booking | 预约引擎 |
/// | catalog | 价格目录 |
/// | orders | 订单与支付 |
#[derive(Clone)]
pub struct BookingState {
    pub config: Config,
    pub storage: BookingStorage,
    pub clock: Arc<dyn Clock>,
    pub generator: SlotGenerator,
    pub slot_admin: SlotAdmin,
    pub booking: BookingEngine,
    pub catalog: PricingCatalog,
    pub orders: OrderManager,
}

impl BookingState {
    /// Open the database under `work_dir` and wire every component
    ///
    /// Notifications go to the log sink; the payment provider is supplied by
    /// the caller.
    pub fn initialize(
        config: &Config,
        provider: Arc<dyn PaymentProvider>,
    ) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let db_path = config.database_path();
        tracing::info!(path = %db_path.display(), "Opening booking database");
        let storage = BookingStorage::open(&db_path)?;

        Ok(Self::with_parts(
            config.clone(),
            storage,
            Arc::new(SystemClock),
            Arc::new(LogNotificationSink),
            provider,
        ))
    }

    /// Wire components over explicit parts (tests, embedding)
    pub fn with_parts(
        config: Config,
        storage: BookingStorage,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let notifier = Notifier::new(sink);
        let generator = SlotGenerator::new(
            storage.clone(),
            config.slots.clone(),
            clock.clone(),
            config.timezone,
        );
        let slot_admin = SlotAdmin::new(storage.clone(), clock.clone());
        let booking = BookingEngine::new(
            storage.clone(),
            generator.clone(),
            notifier.clone(),
            config.reminders.clone(),
        );
        let catalog = PricingCatalog::new();
        let calculator = PricingCalculator::new(catalog.clone(), config.pricing.clone());
        let orders = OrderManager::new(
            storage.clone(),
            calculator,
            provider,
            notifier,
            clock.clone(),
            config.timezone,
        );

        tracing::info!(
            timezone = %config.timezone,
            currency = %config.pricing.currency,
            horizon_days = config.slots.horizon_days,
            "Booking state initialized"
        );

        Self {
            config,
            storage,
            clock,
            generator,
            slot_admin,
            booking,
            catalog,
            orders,
        }
    }

    /// 启动后台任务 (时段生成 + 提醒)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        MaintenanceScheduler::new(
            self.booking.clone(),
            self.generator.clone(),
            self.config.scheduler,
            tasks.shutdown_token(),
        )
        .register(&mut tasks);
        tasks.log_summary();
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixedClock;
    use crate::notify::MemoryNotificationSink;
    use crate::orders::CheckoutRequest;
    use crate::payment::MockPaymentProvider;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use shared::models::{AppointmentFeeMode, Service};

    #[tokio::test]
    async fn test_components_share_storage_and_catalog() {
        let config = Config::from_lookup(|key| match key {
            "BUSINESS_TZ" => Some("UTC".into()),
            _ => None,
        });
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap(),
        ));
        let state = BookingState::with_parts(
            config,
            BookingStorage::open_in_memory().unwrap(),
            clock,
            Arc::new(MemoryNotificationSink::new()),
            Arc::new(MockPaymentProvider::new()),
        );

        state.catalog.upsert_service(Service {
            id: 1,
            name: "Travel insurance".into(),
            price: Decimal::new(8000, 0),
            appointment_fee: None,
            appointment_fee_mode: AppointmentFeeMode::ServicePlusAppointment,
            requires_appointment: false,
            is_active: true,
        });

        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let slot = state.booking.list_available(date, Some(1)).await.unwrap()[0].clone();
        let result = state
            .orders
            .checkout(CheckoutRequest::new(3, 1).with_slot(slot.id))
            .await
            .unwrap();
        assert_eq!(result.order.total_amount, Decimal::new(10000, 0));
        assert_eq!(state.slot_admin.get_slot(slot.id).unwrap().current_bookings, 1);
    }

    #[tokio::test]
    async fn test_initialize_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(|key| match key {
            "WORK_DIR" => Some(dir.path().join("data").to_string_lossy().into_owned()),
            _ => None,
        });
        let state =
            BookingState::initialize(&config, Arc::new(MockPaymentProvider::new())).unwrap();
        assert!(config.database_path().exists());

        let tasks = state.start_background_tasks();
        assert_eq!(tasks.len(), 2);
        tasks.shutdown().await;
    }
}
