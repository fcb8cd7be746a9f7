//! Booking price calculation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Money is kept at two fractional digits, rounded half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub base_price: Decimal,
    pub platform_fee: Decimal,
    pub deposit: Decimal,
    pub total_amount: Decimal,
}

/// Price a booking of `days` days.
///
/// `fee_percent` is a percentage (10 means ten percent). Deposit defaults to zero.
pub fn quote(
    price_per_day: Decimal,
    days: i64,
    deposit: Option<Decimal>,
    fee_percent: Decimal,
) -> Result<PriceQuote, AppError> {
    if days < 1 {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "Invalid booking duration"
        )));
    }
    if price_per_day < Decimal::ZERO {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "Item price must not be negative"
        )));
    }

    let deposit = round_money(deposit.unwrap_or(Decimal::ZERO));
    if deposit < Decimal::ZERO {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "Deposit must not be negative"
        )));
    }

    let base_price = round_money(price_per_day * Decimal::from(days));
    let platform_fee = round_money(base_price * fee_percent / Decimal::ONE_HUNDRED);

    Ok(PriceQuote {
        base_price,
        platform_fee,
        deposit,
        total_amount: base_price + platform_fee + deposit,
    })
}

/// Convert a major-unit amount to integer minor units (paise), half-up.
pub fn to_minor_units(amount: Decimal) -> Result<u64, AppError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| {
            AppError::ValidationError(anyhow::anyhow!("Invalid payment amount: {}", amount))
        })
}
