//! American odds conversion.
//!
//! Pure fixed-point math: no state, no I/O. Results are rounded to the
//! currency's minor unit with banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{WagerError, WagerStatus, MONEY_SCALE};

/// Round to the minor unit (half-to-even) and pin the scale so amounts
/// always render with two places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(MONEY_SCALE);
    rounded
}

fn out_of_range(amount: Decimal, odds: i32) -> WagerError {
    WagerError::Validation(format!("payout on {amount} at {odds:+} is out of range"))
}

/// Profit on a winning wager, excluding the returned stake.
pub fn profit_for_win(amount: Decimal, odds: i32) -> Result<Decimal, WagerError> {
    let price = Decimal::from(odds);
    let profit = match odds {
        0 => return Err(WagerError::InvalidOdds(odds)),
        o if o > 0 => amount
            .checked_mul(price)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
        _ => amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|v| v.checked_div(price.abs())),
    };
    profit
        .map(round_money)
        .ok_or_else(|| out_of_range(amount, odds))
}

/// Total returned on a WON wager: stake plus profit.
pub fn payout_for_win(amount: Decimal, odds: i32) -> Result<Decimal, WagerError> {
    amount
        .checked_add(profit_for_win(amount, odds)?)
        .map(round_money)
        .ok_or_else(|| out_of_range(amount, odds))
}

/// Payout for a terminal status. PUSH and VOID return the stake, LOST pays
/// nothing. Odds are validated for every status so a corrupt price is
/// never settled silently.
pub fn payout_for(status: WagerStatus, amount: Decimal, odds: i32) -> Result<Decimal, WagerError> {
    if odds == 0 {
        return Err(WagerError::InvalidOdds(odds));
    }
    match status {
        WagerStatus::Won => payout_for_win(amount, odds),
        WagerStatus::Push | WagerStatus::Void => Ok(round_money(amount)),
        WagerStatus::Lost => Ok(round_money(Decimal::ZERO)),
        WagerStatus::Pending => Err(WagerError::Validation(
            "pending wagers have no payout".to_string(),
        )),
    }
}

/// Break-even win probability implied by a price, as a fraction in (0, 1).
pub fn implied_probability(odds: i32) -> Result<Decimal, WagerError> {
    let price = Decimal::from(odds);
    let p = match odds {
        0 => return Err(WagerError::InvalidOdds(odds)),
        o if o > 0 => Decimal::ONE_HUNDRED / (price + Decimal::ONE_HUNDRED),
        _ => price.abs() / (price.abs() + Decimal::ONE_HUNDRED),
    };
    Ok(p.round_dp(4))
}

/// European decimal odds (total return per unit staked).
pub fn to_decimal_odds(odds: i32) -> Result<Decimal, WagerError> {
    Ok(payout_for_win(Decimal::ONE_HUNDRED, odds)? / Decimal::ONE_HUNDRED)
}
