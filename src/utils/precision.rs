// src/utils/precision.rs
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept on PnL percentages before they are compared.
pub const PERCENT_DP: u32 = 2;

/// Rounds a quantity DOWN to a multiple of `step`. A zero step is a no-op.
/// amount=10.999, step=0.01 -> 10.99
pub fn normalize_quantity(amount: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return amount;
    }
    ((amount / step).floor() * step).normalize()
}

/// Rounds a price to the NEAREST multiple of `tick`. A zero tick is a no-op.
/// price=100.16, tick=0.1 -> 100.2
pub fn normalize_price(price: Decimal, tick: Decimal) -> Decimal {
    if tick.is_zero() {
        return price;
    }
    ((price / tick).round() * tick).normalize()
}

/// `value / base * 100`, rounded half-away-from-zero to [`PERCENT_DP`] places.
/// `None` when `base` is zero.
pub fn percent_of(value: Decimal, base: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    let pct = value.checked_div(base)?.checked_mul(Decimal::ONE_HUNDRED)?;
    Some(pct.round_dp_with_strategy(PERCENT_DP, RoundingStrategy::MidpointAwayFromZero))
}
