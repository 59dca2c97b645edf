//! Service catalog models used for pricing
//!
//! Service ↔ Destination price overrides live in an explicit lookup entity
//! ([`ServiceDestinationPricing`]) keyed by both ids.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the appointment fee combines with the service price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentFeeMode {
    /// Total is just the appointment fee
    AppointmentOnly,
    /// Service total plus the flat appointment fee
    #[default]
    ServicePlusAppointment,
}

/// A sellable service (visa assistance, travel insurance, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: i64,
    pub name: String,
    /// Base price
    pub price: Decimal,
    /// Overrides the configured default appointment fee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_fee: Option<Decimal>,
    #[serde(default)]
    pub appointment_fee_mode: AppointmentFeeMode,
    #[serde(default)]
    pub requires_appointment: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Fixed-price variant of a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubService {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub id: i64,
    pub name: String,
    /// ISO 3166-1 alpha-2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// Destination-specific price for a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDestinationPricing {
    pub service_id: i64,
    pub destination_id: i64,
    pub price: Decimal,
}

/// Processing speed option (standard, express, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingTimeOption {
    pub id: i64,
    /// None = available to every service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<i64>,
    pub label: String,
    /// Applied to the running total (1.0 = standard)
    pub multiplier: Decimal,
}

impl ProcessingTimeOption {
    pub fn applies_to(&self, service_id: i64) -> bool {
        self.service_id.is_none_or(|id| id == service_id)
    }
}
