//! Order pricing

mod calculator;
mod catalog;

pub use calculator::{
    PriceQuote, PriceRequest, PricingCalculator, PricingError, PricingInput, PricingResult,
};
pub use catalog::PricingCatalog;
