//! Per-account betting statistics, derived from the ledger on demand.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::engine::odds::round_money;
use crate::types::{StatsRow, WagerError, WagerStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BettingStats {
    pub total_bets: usize,
    pub settled: usize,
    /// Stakes of settled wagers, voids excluded.
    pub total_wagered: Decimal,
    /// Returns of all settled wagers, void refunds included.
    pub total_payout: Decimal,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub voids: usize,
    pub pending: usize,
    /// Percent of decided (won or lost) wagers that won.
    pub win_rate: Decimal,
    pub profit: Decimal,
    /// Profit as a percent of `total_wagered`.
    pub roi: Decimal,
}

pub struct StatsAggregator;

impl StatsAggregator {
    /// Fails only if the ledger's amounts overflow when summed.
    pub fn summarize(rows: &[StatsRow]) -> Result<BettingStats, WagerError> {
        let mut stats = BettingStats {
            total_bets: rows.len(),
            settled: 0,
            total_wagered: Decimal::ZERO,
            total_payout: Decimal::ZERO,
            wins: 0,
            losses: 0,
            pushes: 0,
            voids: 0,
            pending: 0,
            win_rate: Decimal::ZERO,
            profit: Decimal::ZERO,
            roi: Decimal::ZERO,
        };

        for row in rows {
            match row.status {
                WagerStatus::Pending => {
                    stats.pending += 1;
                    continue;
                }
                WagerStatus::Won => stats.wins += 1,
                WagerStatus::Lost => stats.losses += 1,
                WagerStatus::Push => stats.pushes += 1,
                WagerStatus::Void => stats.voids += 1,
            }
            stats.settled += 1;
            stats.total_payout = stats
                .total_payout
                .checked_add(row.payout.unwrap_or_default())
                .ok_or_else(|| overflow("total payout"))?;
            if row.status != WagerStatus::Void {
                stats.total_wagered = stats
                    .total_wagered
                    .checked_add(row.amount)
                    .ok_or_else(|| overflow("total wagered"))?;
            }
        }

        stats.total_wagered = round_money(stats.total_wagered);
        stats.total_payout = round_money(stats.total_payout);
        stats.profit = stats
            .total_payout
            .checked_sub(stats.total_wagered)
            .map(round_money)
            .ok_or_else(|| overflow("profit"))?;

        let decided = stats.wins + stats.losses;
        if decided > 0 {
            stats.win_rate = percent(Decimal::from(stats.wins), Decimal::from(decided))
                .ok_or_else(|| overflow("win rate"))?;
        }
        if !stats.total_wagered.is_zero() {
            stats.roi = percent(stats.profit, stats.total_wagered).ok_or_else(|| overflow("roi"))?;
        }

        Ok(stats)
    }
}

fn overflow(what: &str) -> WagerError {
    WagerError::DataInconsistency(format!("{what} overflowed"))
}

/// `part / whole` as a percentage with two places. `whole` is non-zero.
fn percent(part: Decimal, whole: Decimal) -> Option<Decimal> {
    part.checked_div(whole)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|p| p.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}
