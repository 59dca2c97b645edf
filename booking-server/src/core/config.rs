//! Booking server configuration
//!
//! # 环境变量
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | WORK_DIR | /var/lib/agency/booking | 工作目录 (redb 文件、日志) |
//! | LOG_LEVEL | info | 日志级别 |
//! | LOG_DIR | (none) | 日志目录, 设置后按天滚动写文件 |
//! | BUSINESS_TZ | Africa/Douala | 营业时区 |
//! | CURRENCY | XAF | 币种 |
//! | CURRENCY_MINOR_UNITS | 0 | 币种小数位 |
//! | APPOINTMENT_FEE | 2000 | 默认预约费 |
//! | WORK_START / WORK_END | 08:00 / 17:00 | 营业时间 |
//! | LUNCH_START / LUNCH_END | 12:00 / 13:00 | 午休 (设为空字符串关闭) |
//! | SLOT_DURATION_MINUTES | 30 | 时段长度 (1..=1440) |
//! | MAX_BOOKINGS_PER_SLOT | 1 | 每个时段容量 |
//! | CLOSED_WEEKDAYS | sun | 休息日, 逗号分隔 |
//! | HOLIDAYS | (none) | 节假日 YYYY-MM-DD, 逗号分隔 |
//! | SLOT_HORIZON_DAYS | 30 | 循环生成天数 (0..=366) |
//! | REMINDER_OFFSETS_HOURS | 24,2 | 提醒提前小时数 (1..=744) |
//! | GENERATION_INTERVAL_SECS | 3600 | 循环生成间隔 |
//! | REMINDER_INTERVAL_SECS | 300 | 提醒扫描间隔 |

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

const TIME_FORMAT: &str = "%H:%M";

/// 时段长度上限 (一天)
pub const MAX_SLOT_DURATION_MINUTES: u32 = 24 * 60;
/// 循环生成天数上限
pub const MAX_HORIZON_DAYS: u32 = 366;
/// 提醒提前量上限 (31 天)
pub const MAX_REMINDER_OFFSET_HOURS: u32 = 24 * 31;

/// Lunch break, slots overlapping it are skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunchBreak {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Opening hours for one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub lunch: Option<LunchBreak>,
}

impl WorkHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            lunch: None,
        }
    }

    pub fn with_lunch(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.lunch = Some(LunchBreak { start, end });
        self
    }
}

impl Default for WorkHours {
    fn default() -> Self {
        Self::new(hm(8, 0), hm(17, 0)).with_lunch(hm(12, 0), hm(13, 0))
    }
}

/// Weekly work-hours template: default hours plus per-weekday overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSchedule {
    pub default_hours: WorkHours,
    pub overrides: HashMap<Weekday, WorkHours>,
}

impl WorkSchedule {
    pub fn new(default_hours: WorkHours) -> Self {
        Self {
            default_hours,
            overrides: HashMap::new(),
        }
    }

    /// e.g. shorter Saturday hours
    pub fn with_override(mut self, weekday: Weekday, hours: WorkHours) -> Self {
        self.overrides.insert(weekday, hours);
        self
    }

    pub fn hours_for(&self, weekday: Weekday) -> &WorkHours {
        self.overrides.get(&weekday).unwrap_or(&self.default_hours)
    }
}

/// Slot generation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGenerationConfig {
    pub schedule: WorkSchedule,
    pub slot_duration_minutes: u32,
    pub max_bookings_per_slot: u32,
    pub closed_weekdays: HashSet<Weekday>,
    pub holidays: BTreeSet<NaiveDate>,
    /// Days ahead covered by recurring generation
    pub horizon_days: u32,
}

impl SlotGenerationConfig {
    pub fn is_closed(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        self.closed_weekdays.contains(&date.weekday()) || self.holidays.contains(&date)
    }
}

impl Default for SlotGenerationConfig {
    fn default() -> Self {
        Self {
            schedule: WorkSchedule::default(),
            slot_duration_minutes: 30,
            max_bookings_per_slot: 1,
            closed_weekdays: HashSet::from([Weekday::Sun]),
            holidays: BTreeSet::new(),
            horizon_days: 30,
        }
    }
}

/// Reminder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
    /// Hours before the appointment start
    pub offsets_hours: Vec<u32>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            offsets_hours: vec![24, 2],
        }
    }
}

/// Money settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    pub currency: String,
    /// 0 for zero-decimal currencies
    pub minor_units: u32,
    pub default_appointment_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "XAF".to_string(),
            minor_units: 0,
            default_appointment_fee: Decimal::new(2000, 0),
        }
    }
}

/// Maintenance scheduler intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub generation_interval_secs: u64,
    pub reminder_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generation_interval_secs: 3600,
            reminder_interval_secs: 300,
        }
    }
}

/// 预约服务配置
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存放数据库和日志
    pub work_dir: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 营业时区, 时段日期和时间都按此时区解释
    pub timezone: Tz,
    pub slots: SlotGenerationConfig,
    pub reminders: ReminderConfig,
    pub pricing: PricingConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的值使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same parsing as [`Config::from_env`] over an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SlotGenerationConfig::default();
        let default_hours = WorkHours::default();

        let start = parse_time(&lookup, "WORK_START", default_hours.start);
        let end = parse_time(&lookup, "WORK_END", default_hours.end);
        let (start, end) = if start < end {
            (start, end)
        } else {
            tracing::warn!(%start, %end, "WORK_START must be before WORK_END, using defaults");
            (default_hours.start, default_hours.end)
        };
        let lunch = parse_lunch(&lookup, default_hours.lunch);

        let slots = SlotGenerationConfig {
            schedule: WorkSchedule::new(WorkHours { start, end, lunch }),
            slot_duration_minutes: parse_bounded(
                &lookup,
                "SLOT_DURATION_MINUTES",
                30,
                1..=MAX_SLOT_DURATION_MINUTES,
            ),
            max_bookings_per_slot: parse_or(&lookup, "MAX_BOOKINGS_PER_SLOT", 1u32),
            closed_weekdays: lookup("CLOSED_WEEKDAYS")
                .map(|v| parse_list::<Weekday>(&v, "CLOSED_WEEKDAYS").into_iter().collect())
                .unwrap_or(defaults.closed_weekdays),
            holidays: lookup("HOLIDAYS")
                .map(|v| parse_list::<NaiveDate>(&v, "HOLIDAYS").into_iter().collect())
                .unwrap_or_default(),
            horizon_days: parse_bounded(
                &lookup,
                "SLOT_HORIZON_DAYS",
                defaults.horizon_days,
                0..=MAX_HORIZON_DAYS,
            ),
        };

        let reminders = ReminderConfig {
            offsets_hours: lookup("REMINDER_OFFSETS_HOURS")
                .map(|v| {
                    parse_list::<u32>(&v, "REMINDER_OFFSETS_HOURS")
                        .into_iter()
                        .filter(|&hours| {
                            let ok = (1..=MAX_REMINDER_OFFSET_HOURS).contains(&hours);
                            if !ok {
                                tracing::warn!(
                                    hours,
                                    max = MAX_REMINDER_OFFSET_HOURS,
                                    "Ignoring out-of-range reminder offset"
                                );
                            }
                            ok
                        })
                        .collect()
                })
                .unwrap_or_else(|| ReminderConfig::default().offsets_hours),
        };

        let pricing_defaults = PricingConfig::default();
        let pricing = PricingConfig {
            currency: lookup("CURRENCY").unwrap_or(pricing_defaults.currency),
            minor_units: parse_or(&lookup, "CURRENCY_MINOR_UNITS", pricing_defaults.minor_units),
            default_appointment_fee: parse_or(
                &lookup,
                "APPOINTMENT_FEE",
                pricing_defaults.default_appointment_fee,
            ),
        };

        let scheduler_defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            generation_interval_secs: parse_or(
                &lookup,
                "GENERATION_INTERVAL_SECS",
                scheduler_defaults.generation_interval_secs,
            )
            .max(1),
            reminder_interval_secs: parse_or(
                &lookup,
                "REMINDER_INTERVAL_SECS",
                scheduler_defaults.reminder_interval_secs,
            )
            .max(1),
        };

        Self {
            work_dir: lookup("WORK_DIR").unwrap_or_else(|| "/var/lib/agency/booking".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: lookup("LOG_DIR").filter(|d| !d.is_empty()),
            timezone: parse_or(&lookup, "BUSINESS_TZ", chrono_tz::Africa::Douala),
            slots,
            reminders,
            pricing,
            scheduler,
        }
    }

    /// 数据库文件路径
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.work_dir).join("booking.redb")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid config value, using default");
                default
            }
        },
        None => default,
    }
}

fn parse_bounded<F>(
    lookup: &F,
    key: &str,
    default: u32,
    range: std::ops::RangeInclusive<u32>,
) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default);
    if range.contains(&value) {
        value
    } else {
        tracing::warn!(
            key,
            value,
            min = *range.start(),
            max = *range.end(),
            "Config value out of range, using default"
        );
        default
    }
}

fn parse_time<F>(lookup: &F, key: &str, default: NaiveTime) -> NaiveTime
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid time (expected HH:MM), using default");
            default
        }),
        None => default,
    }
}

fn parse_lunch<F>(lookup: &F, default: Option<LunchBreak>) -> Option<LunchBreak>
where
    F: Fn(&str) -> Option<String>,
{
    let (start, end) = match (lookup("LUNCH_START"), lookup("LUNCH_END")) {
        (None, None) => return default,
        (Some(s), Some(e)) if s.trim().is_empty() && e.trim().is_empty() => return None,
        (s, e) => (s.unwrap_or_default(), e.unwrap_or_default()),
    };
    match (
        NaiveTime::parse_from_str(start.trim(), TIME_FORMAT),
        NaiveTime::parse_from_str(end.trim(), TIME_FORMAT),
    ) {
        (Ok(start), Ok(end)) if start < end => Some(LunchBreak { start, end }),
        _ => {
            tracing::warn!(%start, %end, "Invalid lunch break, using default");
            default
        }
    }
}

fn parse_list<T: FromStr>(raw: &str, key: &str) -> Vec<T> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|item| match item.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, item, "Ignoring invalid list entry");
                None
            }
        })
        .collect()
}
