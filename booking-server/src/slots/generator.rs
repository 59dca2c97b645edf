//! 时段生成
//!
//! 按营业时间模板把某一天切成固定长度的时段。生成是幂等的:
//! 同一 date+start+end 的时段已存在时跳过, 已有计数不受影响。

use super::error::{SlotError, SlotResult};
use crate::core::config::MAX_HORIZON_DAYS;
use crate::core::{Clock, SlotGenerationConfig};
use crate::storage::BookingStorage;
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use redb::WriteTransaction;
use shared::models::{Slot, SlotKey};
use shared::util::snowflake_id;
use std::sync::Arc;

/// Result of a multi-day generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Dates examined
    pub days: u32,
    /// Slots newly created
    pub created: usize,
}

#[derive(Clone)]
pub struct SlotGenerator {
    storage: BookingStorage,
    config: Arc<SlotGenerationConfig>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl SlotGenerator {
    pub fn new(
        storage: BookingStorage,
        config: SlotGenerationConfig,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            storage,
            config: Arc::new(config),
            clock,
            tz,
        }
    }

    pub fn config(&self) -> &SlotGenerationConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today(self.tz)
    }

    /// Intervals to materialize for `date`
    ///
    /// Closed weekdays and holidays yield nothing. Explicit pairs are used as
    /// given; otherwise the day's work hours are stepped by the slot duration
    /// and steps overlapping lunch are skipped.
    pub fn plan(
        &self,
        date: NaiveDate,
        explicit: Option<&[(NaiveTime, NaiveTime)]>,
    ) -> SlotResult<Vec<(NaiveTime, NaiveTime)>> {
        if let Some(pairs) = explicit {
            for &(start, end) in pairs {
                if start >= end {
                    return Err(SlotError::InvalidTimeRange { start, end });
                }
            }
        }
        if self.config.is_closed(date) {
            return Ok(Vec::new());
        }
        if let Some(pairs) = explicit {
            return Ok(pairs.to_vec());
        }

        let hours = self.config.schedule.hours_for(date.weekday());
        let Some(step) = self.config.slot_duration_minutes.max(1).checked_mul(60) else {
            tracing::warn!(
                minutes = self.config.slot_duration_minutes,
                "Slot duration out of range, nothing generated"
            );
            return Ok(Vec::new());
        };
        let day_end = hours.end.num_seconds_from_midnight();
        let lunch = hours.lunch.map(|l| {
            (
                l.start.num_seconds_from_midnight(),
                l.end.num_seconds_from_midnight(),
            )
        });

        let mut intervals = Vec::new();
        let mut cursor = hours.start.num_seconds_from_midnight();
        while let Some(end) = cursor.checked_add(step)
            && end <= day_end
        {
            let start = cursor;
            cursor = end;
            if let Some((lunch_start, lunch_end)) = lunch
                && start < lunch_end
                && end > lunch_start
            {
                continue;
            }
            if let (Some(s), Some(e)) = (
                NaiveTime::from_num_seconds_from_midnight_opt(start, 0),
                NaiveTime::from_num_seconds_from_midnight_opt(end, 0),
            ) {
                intervals.push((s, e));
            }
        }
        Ok(intervals)
    }

    /// Generate slots for one date, returns the number newly created
    pub fn generate_for_date(
        &self,
        date: NaiveDate,
        explicit: Option<&[(NaiveTime, NaiveTime)]>,
    ) -> SlotResult<usize> {
        let today = self.today();
        if date < today {
            return Err(SlotError::InvalidDateRange {
                from: date,
                to: date,
                today,
            });
        }

        let intervals = self.plan(date, explicit)?;
        if intervals.is_empty() {
            tracing::debug!(%date, "No slots to generate (closed day)");
            return Ok(0);
        }

        let txn = self.storage.begin_write()?;
        let created = self.insert_missing(&txn, date, &intervals)?;
        self.storage.commit(txn)?;

        if created > 0 {
            tracing::info!(%date, created, "Generated slots");
        } else {
            tracing::debug!(%date, "Slots already generated");
        }
        Ok(created)
    }

    fn insert_missing(
        &self,
        txn: &WriteTransaction,
        date: NaiveDate,
        intervals: &[(NaiveTime, NaiveTime)],
    ) -> SlotResult<usize> {
        let now = self.clock.now_millis();
        let mut created = 0;
        for &(start, end) in intervals {
            let key = SlotKey::new(date, start, end);
            if self.storage.find_slot_id_txn(txn, &key)?.is_some() {
                continue;
            }
            let slot = Slot {
                id: snowflake_id(),
                date,
                start_time: start,
                end_time: end,
                is_disabled: false,
                max_bookings: self.config.max_bookings_per_slot,
                current_bookings: 0,
                service_id: None,
                created_at: now,
                updated_at: now,
            };
            self.storage.put_slot(txn, &slot)?;
            created += 1;
        }
        Ok(created)
    }

    /// Generate every date in `[from, to]`, one transaction per date
    pub fn generate_range(&self, from: NaiveDate, to: NaiveDate) -> SlotResult<GenerationReport> {
        let today = self.today();
        if from > to || from < today {
            return Err(SlotError::InvalidDateRange { from, to, today });
        }

        let mut report = GenerationReport::default();
        for date in from.iter_days().take_while(|d| *d <= to) {
            report.created += self.generate_for_date(date, None)?;
            report.days += 1;
        }
        Ok(report)
    }

    /// Today through today + horizon (configured horizon when `None`)
    ///
    /// Safe to call repeatedly from a periodic trigger.
    pub fn generate_recurring(&self, horizon_days: Option<u32>) -> SlotResult<GenerationReport> {
        let horizon = horizon_days.unwrap_or(self.config.horizon_days);
        let today = self.today();
        let to = match today.checked_add_days(Days::new(u64::from(horizon))) {
            Some(to) if horizon <= MAX_HORIZON_DAYS => to,
            to => {
                return Err(SlotError::InvalidDateRange {
                    from: today,
                    to: to.unwrap_or(NaiveDate::MAX),
                    today,
                });
            }
        };
        let report = self.generate_range(today, to)?;
        tracing::info!(
            from = %today,
            to = %to,
            days = report.days,
            created = report.created,
            "Recurring slot generation finished"
        );
        Ok(report)
    }
}
