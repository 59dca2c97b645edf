//! Price Calculator
//!
//! Precedence, each step replacing or adjusting the running total:
//!
//! 1. service base price
//! 2. destination override (if the service defines one for the destination)
//! 3. sub-service fixed price (supersedes the destination override)
//! 4. processing-time multiplier
//! 5. appointment fee: `appointment_only` → fee alone,
//!    `service_plus_appointment` → running total + fee
//!
//! All arithmetic uses `Decimal`; results are rounded to the currency's
//! minor units (half away from zero).

use super::catalog::PricingCatalog;
use crate::core::PricingConfig;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use shared::models::AppointmentFeeMode;
use shared::{AppError, ErrorCode};
use thiserror::Error;

/// Which referenced input could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingInput {
    Service,
    SubService,
    Destination,
    ProcessingTime,
}

impl std::fmt::Display for PricingInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PricingInput::Service => "service",
            PricingInput::SubService => "sub_service",
            PricingInput::Destination => "destination",
            PricingInput::ProcessingTime => "processing_time",
        })
    }
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Pricing input missing: {input} {id}")]
    InputMissing { input: PricingInput, id: i64 },

    #[error("Service {0} is not active")]
    InactiveService(i64),

    #[error("Processing time {id} has a negative multiplier {multiplier}")]
    NegativeMultiplier { id: i64, multiplier: Decimal },

    #[error("Price of service {service_id} is out of range")]
    Overflow { service_id: i64 },
}

pub type PricingResult<T> = Result<T, PricingError>;

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        let message = err.to_string();
        match err {
            PricingError::InputMissing { input, id } => {
                AppError::with_message(ErrorCode::PricingInputMissing, message)
                    .with_detail("input", input.to_string())
                    .with_detail("id", id)
            }
            PricingError::InactiveService(id) => {
                AppError::with_message(ErrorCode::ValidationFailed, message)
                    .with_detail("service_id", id)
            }
            PricingError::NegativeMultiplier { id, .. } => {
                AppError::with_message(ErrorCode::ValidationFailed, message)
                    .with_detail("processing_time_id", id)
            }
            PricingError::Overflow { service_id } => {
                AppError::with_message(ErrorCode::ValidationFailed, message)
                    .with_detail("service_id", service_id)
            }
        }
    }
}

/// Inputs for one price computation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceRequest {
    pub service_id: i64,
    pub sub_service_id: Option<i64>,
    pub destination_id: Option<i64>,
    pub processing_time_id: Option<i64>,
    /// Order is bound to an appointment (fee policy applies)
    pub with_appointment: bool,
}

impl PriceRequest {
    pub fn for_service(service_id: i64) -> Self {
        Self {
            service_id,
            ..Default::default()
        }
    }
}

/// Computed price with its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Service part after destination / sub-service / processing time
    pub service_amount: Decimal,
    /// Appointment fee part (zero when not appointment-bound)
    pub appointment_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct PricingCalculator {
    catalog: PricingCatalog,
    config: PricingConfig,
}

impl PricingCalculator {
    pub fn new(catalog: PricingCatalog, config: PricingConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    fn round(&self, value: Decimal) -> Decimal {
        value
            .max(Decimal::ZERO)
            .round_dp_with_strategy(self.config.minor_units, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn quote(&self, request: &PriceRequest) -> PricingResult<PriceQuote> {
        let service = self
            .catalog
            .get_service(request.service_id)
            .ok_or(PricingError::InputMissing {
                input: PricingInput::Service,
                id: request.service_id,
            })?;
        if !service.is_active {
            return Err(PricingError::InactiveService(service.id));
        }

        let fee = service
            .appointment_fee
            .unwrap_or(self.config.default_appointment_fee);

        if request.with_appointment && service.appointment_fee_mode == AppointmentFeeMode::AppointmentOnly
        {
            let fee = self.round(fee);
            return Ok(PriceQuote {
                service_amount: Decimal::ZERO,
                appointment_fee: fee,
                total: fee,
                currency: self.config.currency.clone(),
            });
        }

        let mut running = service.price;

        if let Some(destination_id) = request.destination_id {
            if self.catalog.get_destination(destination_id).is_none() {
                return Err(PricingError::InputMissing {
                    input: PricingInput::Destination,
                    id: destination_id,
                });
            }
            if let Some(price) = self.catalog.destination_price(service.id, destination_id) {
                running = price;
            }
        }

        if let Some(sub_service_id) = request.sub_service_id {
            let sub = self
                .catalog
                .get_sub_service(sub_service_id)
                .filter(|s| s.service_id == service.id)
                .ok_or(PricingError::InputMissing {
                    input: PricingInput::SubService,
                    id: sub_service_id,
                })?;
            running = sub.price;
        }

        if let Some(option_id) = request.processing_time_id {
            let option = self
                .catalog
                .get_processing_time(option_id)
                .filter(|o| o.applies_to(service.id))
                .ok_or(PricingError::InputMissing {
                    input: PricingInput::ProcessingTime,
                    id: option_id,
                })?;
            if option.multiplier.is_sign_negative() {
                return Err(PricingError::NegativeMultiplier {
                    id: option.id,
                    multiplier: option.multiplier,
                });
            }
            running = running
                .checked_mul(option.multiplier)
                .ok_or(PricingError::Overflow {
                    service_id: service.id,
                })?;
        }

        let service_amount = self.round(running);
        let appointment_fee = if request.with_appointment {
            self.round(fee)
        } else {
            Decimal::ZERO
        };

        let total = service_amount
            .checked_add(appointment_fee)
            .ok_or(PricingError::Overflow {
                service_id: service.id,
            })?;

        Ok(PriceQuote {
            service_amount,
            appointment_fee,
            total: self.round(total),
            currency: self.config.currency.clone(),
        })
    }

    /// Total only
    pub fn calculate_total(&self, request: &PriceRequest) -> PricingResult<Decimal> {
        Ok(self.quote(request)?.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{
        Destination, ProcessingTimeOption, Service, ServiceDestinationPricing, SubService,
    };

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn calculator(mode: AppointmentFeeMode) -> PricingCalculator {
        let catalog = PricingCatalog::new();
        catalog.upsert_service(Service {
            id: 1,
            name: "Visa assistance".into(),
            price: dec(10000),
            appointment_fee: None,
            appointment_fee_mode: mode,
            requires_appointment: true,
            is_active: true,
        });
        catalog.upsert_destination(Destination {
            id: 5,
            name: "France".into(),
            country_code: Some("FR".into()),
        });
        catalog.upsert_destination(Destination {
            id: 6,
            name: "Canada".into(),
            country_code: Some("CA".into()),
        });
        catalog.set_destination_price(ServiceDestinationPricing {
            service_id: 1,
            destination_id: 5,
            price: dec(12000),
        });
        catalog.upsert_sub_service(SubService {
            id: 20,
            service_id: 1,
            name: "Student visa".into(),
            price: dec(8000),
        });
        catalog.upsert_processing_time(ProcessingTimeOption {
            id: 30,
            service_id: None,
            label: "Express".into(),
            multiplier: Decimal::new(15, 1),
        });
        catalog.upsert_processing_time(ProcessingTimeOption {
            id: 31,
            service_id: Some(99),
            label: "Other service only".into(),
            multiplier: dec(2),
        });
        PricingCalculator::new(catalog, PricingConfig::default())
    }

    fn request() -> PriceRequest {
        PriceRequest {
            service_id: 1,
            destination_id: Some(5),
            with_appointment: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_destination_override_plus_fee() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let quote = calc.quote(&request()).unwrap();
        assert_eq!(quote.service_amount, dec(12000));
        assert_eq!(quote.appointment_fee, dec(2000));
        assert_eq!(quote.total, dec(14000));
        assert_eq!(quote.currency, "XAF");
    }

    #[test]
    fn test_sub_service_supersedes_destination() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let req = PriceRequest {
            sub_service_id: Some(20),
            ..request()
        };
        assert_eq!(calc.calculate_total(&req).unwrap(), dec(10000));
    }

    #[test]
    fn test_appointment_only_ignores_service_pricing() {
        let calc = calculator(AppointmentFeeMode::AppointmentOnly);
        let req = PriceRequest {
            sub_service_id: Some(20),
            processing_time_id: Some(30),
            ..request()
        };
        let quote = calc.quote(&req).unwrap();
        assert_eq!(quote.total, dec(2000));
        assert_eq!(quote.service_amount, Decimal::ZERO);
    }

    #[test]
    fn test_destination_without_override_keeps_base() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let req = PriceRequest {
            destination_id: Some(6),
            with_appointment: false,
            ..request()
        };
        assert_eq!(calc.calculate_total(&req).unwrap(), dec(10000));
    }

    #[test]
    fn test_processing_multiplier_and_rounding() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        // 8000 * 1.5 = 12000, + 2000
        let req = PriceRequest {
            sub_service_id: Some(20),
            processing_time_id: Some(30),
            ..request()
        };
        assert_eq!(calc.calculate_total(&req).unwrap(), dec(14000));

        calc.catalog().upsert_processing_time(ProcessingTimeOption {
            id: 32,
            service_id: Some(1),
            label: "Odd".into(),
            multiplier: Decimal::new(10005, 4),
        });
        // 12000 * 1.0005 = 12006
        let req = PriceRequest {
            processing_time_id: Some(32),
            with_appointment: false,
            ..request()
        };
        assert_eq!(calc.calculate_total(&req).unwrap(), dec(12006));

        calc.catalog().upsert_processing_time(ProcessingTimeOption {
            id: 33,
            service_id: Some(1),
            label: "Half".into(),
            multiplier: Decimal::new(41667, 5),
        });
        // 12000 * 0.41667 = 5000.04 → 5000
        let req = PriceRequest {
            processing_time_id: Some(33),
            with_appointment: false,
            ..request()
        };
        assert_eq!(calc.calculate_total(&req).unwrap(), dec(5000));
    }

    #[test]
    fn test_missing_inputs() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let cases = [
            (
                PriceRequest::for_service(404),
                PricingInput::Service,
            ),
            (
                PriceRequest {
                    destination_id: Some(404),
                    ..request()
                },
                PricingInput::Destination,
            ),
            (
                PriceRequest {
                    sub_service_id: Some(404),
                    ..request()
                },
                PricingInput::SubService,
            ),
            (
                PriceRequest {
                    processing_time_id: Some(31),
                    ..request()
                },
                PricingInput::ProcessingTime,
            ),
        ];
        for (req, expected) in cases {
            match calc.quote(&req) {
                Err(PricingError::InputMissing { input, .. }) => assert_eq!(input, expected),
                other => panic!("expected missing {expected}, got {other:?}"),
            }
        }

        let err: AppError = calc.quote(&PriceRequest::for_service(404)).unwrap_err().into();
        assert_eq!(err.code, ErrorCode::PricingInputMissing);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let huge = Decimal::from_i128_with_scale(10_i128.pow(20), 0);
        let mut service = calc.catalog().get_service(1).unwrap();
        service.price = huge;
        calc.catalog().upsert_service(service);
        calc.catalog().upsert_processing_time(ProcessingTimeOption {
            id: 40,
            service_id: None,
            label: "Absurd".into(),
            multiplier: huge,
        });

        let req = PriceRequest {
            processing_time_id: Some(40),
            with_appointment: false,
            ..PriceRequest::for_service(1)
        };
        let err = calc.quote(&req).unwrap_err();
        assert!(matches!(err, PricingError::Overflow { service_id: 1 }));
        let err: AppError = err.into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let mut service = calc.catalog().get_service(1).unwrap();
        service.price = Decimal::MAX;
        calc.catalog().upsert_service(service);
        let req = PriceRequest {
            with_appointment: true,
            ..PriceRequest::for_service(1)
        };
        assert!(matches!(
            calc.quote(&req),
            Err(PricingError::Overflow { service_id: 1 })
        ));
    }

    #[test]
    fn test_service_fee_override() {
        let calc = calculator(AppointmentFeeMode::ServicePlusAppointment);
        let mut service = calc.catalog().get_service(1).unwrap();
        service.appointment_fee = Some(dec(3500));
        calc.catalog().upsert_service(service);
        assert_eq!(calc.calculate_total(&request()).unwrap(), dec(15500));
    }
}
