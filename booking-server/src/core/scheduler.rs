//! 维护调度器
//!
//! 两个周期任务:
//!
//! - 循环生成时段: 保证 today..today+horizon 每天都有时段
//! - 预约提醒: 发送到期的提醒
//!
//! 每次触发只调用幂等入口, 重复或补发都是安全的。第一次触发在启动时立即执行,
//! 相当于启动补扫。

use super::config::SchedulerConfig;
use super::tasks::{BackgroundTasks, TaskKind};
use crate::booking::BookingEngine;
use crate::slots::{GenerationReport, SlotGenerator};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MaintenanceScheduler {
    engine: BookingEngine,
    generator: SlotGenerator,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl MaintenanceScheduler {
    pub fn new(
        engine: BookingEngine,
        generator: SlotGenerator,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            generator,
            config,
            shutdown,
        }
    }

    /// Register both loops as periodic background tasks
    pub fn register(self, tasks: &mut BackgroundTasks) {
        let reminders = self.clone();
        tasks.spawn("slot_generation", TaskKind::Periodic, self.run_generation());
        tasks.spawn("appointment_reminders", TaskKind::Periodic, reminders.run_reminders());
    }

    /// One recurring generation pass, errors are logged
    pub async fn generate_once(&self) -> Option<GenerationReport> {
        let generator = self.generator.clone();
        match tokio::task::spawn_blocking(move || generator.generate_recurring(None)).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Recurring slot generation failed");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Recurring slot generation task failed");
                None
            }
        }
    }

    /// One reminder pass, errors are logged
    pub async fn remind_once(&self) -> Option<usize> {
        match self.engine.dispatch_due_reminders().await {
            Ok(sent) => {
                if sent > 0 {
                    tracing::info!(sent, "Reminders dispatched");
                }
                Some(sent)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reminder dispatch failed");
                None
            }
        }
    }

    pub async fn run_generation(self) {
        tracing::info!(
            interval_secs = self.config.generation_interval_secs,
            "Slot generation scheduler started"
        );
        let mut ticker = interval(self.config.generation_interval_secs);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.generate_once().await;
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        tracing::info!("Slot generation scheduler stopped");
    }

    pub async fn run_reminders(self) {
        tracing::info!(
            interval_secs = self.config.reminder_interval_secs,
            "Reminder scheduler started"
        );
        let mut ticker = interval(self.config.reminder_interval_secs);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.remind_once().await;
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        tracing::info!("Reminder scheduler stopped");
    }
}

fn interval(secs: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingRequest;
    use crate::booking::engine::tests::{date, harness};
    use chrono::Duration as ChronoDuration;
    use shared::NotificationKind;
    use shared::models::Booker;

    #[tokio::test]
    async fn test_generate_once_is_idempotent() {
        let h = harness();
        let generator = h.engine.generator().clone();
        let scheduler = MaintenanceScheduler::new(
            h.engine.clone(),
            generator,
            SchedulerConfig::default(),
            CancellationToken::new(),
        );

        let first = scheduler.generate_once().await.unwrap();
        assert!(first.created > 0);
        assert!(!h.storage.slots_on_date(date(20)).unwrap().is_empty());

        let second = scheduler.generate_once().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.days, first.days);
    }

    #[tokio::test]
    async fn test_loops_run_until_shutdown() {
        let h = harness();
        let slot = h.engine.list_available(date(20), None).await.unwrap()[0].clone();
        h.engine
            .book(BookingRequest::new(Booker::registered(1), slot.id))
            .await
            .unwrap();
        // 2026-10-20 08:00 的预约, 提前 24 小时进入提醒窗口
        h.clock.advance(ChronoDuration::hours(2));

        let mut tasks = BackgroundTasks::new();
        let scheduler = MaintenanceScheduler::new(
            h.engine.clone(),
            h.engine.generator().clone(),
            SchedulerConfig::default(),
            tasks.shutdown_token(),
        );
        scheduler.register(&mut tasks);
        assert_eq!(tasks.len(), 2);

        // 第一次 tick 立即触发
        for _ in 0..50 {
            if h.sink.count(NotificationKind::AppointmentReminder) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.sink.count(NotificationKind::AppointmentReminder), 1);
        assert_eq!(tasks.check_health(), 0);

        tasks.shutdown().await;
        assert!(!h.storage.slots_on_date(date(30)).unwrap().is_empty());
    }
}
