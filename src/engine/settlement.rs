//! Settlement engine.
//!
//! Grades every pending wager on a resolved game, moves each one to its
//! terminal status through the ledger's compare-and-swap, and credits the
//! payout only when that transition was ours. Wagers are independent: a
//! bad snapshot on one never stops the sweep.

use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::engine::odds;
use crate::storage::{Bankroll, WagerLedger};
use crate::types::{
    GameEvent, GameId, PickSide, Resolution, Settlement, Transition, Wager, WagerError, WagerId,
    WagerStatus, WagerType,
};

pub use crate::types::FlaggedWager;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one settlement sweep over a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementReport {
    pub game_id: GameId,
    pub won: usize,
    pub lost: usize,
    pub pushed: usize,
    pub voided: usize,
    /// Wagers another sweep settled first. Not credited again.
    pub already_settled: usize,
    pub total_paid: Decimal,
    /// Malformed or unreadable snapshots, left PENDING for manual review.
    pub inconsistent: Vec<FlaggedWager>,
    /// Store errors while transitioning. Still PENDING.
    pub failed: Vec<FlaggedWager>,
    /// Transitioned but the credit did not go through. Needs reconciliation.
    pub credit_failures: Vec<FlaggedWager>,
}

impl SettlementReport {
    pub fn settled(&self) -> usize {
        self.won + self.lost + self.pushed + self.voided
    }
}

enum WagerOutcome {
    Settled { status: WagerStatus, payout: Decimal },
    CreditFailed { status: WagerStatus, reason: String },
    AlreadySettled,
    Inconsistent(String),
    Failed(String),
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

/// Grade a wager against a resolution. Pure: reads only the wager's frozen
/// snapshot. Malformed snapshots are `DataInconsistency`.
pub fn grade(wager: &Wager, resolution: Resolution) -> Result<WagerStatus, WagerError> {
    let (home, away) = match resolution {
        Resolution::Void => return Ok(WagerStatus::Void),
        Resolution::Final { home, away } => (i64::from(home), i64::from(away)),
    };

    let side = wager.pick.side;
    if !wager.wager_type.accepts(side) {
        return Err(WagerError::DataInconsistency(format!(
            "wager {} has side {side} on a {} wager",
            wager.id, wager.wager_type
        )));
    }
    let line = || {
        wager.pick.line.ok_or_else(|| {
            WagerError::DataInconsistency(format!(
                "wager {} is a {} wager without a numeric line",
                wager.id, wager.wager_type
            ))
        })
    };

    let ordering = match wager.wager_type {
        WagerType::Spread => {
            let margin = match side {
                PickSide::Home => home - away,
                _ => away - home,
            };
            (Decimal::from(margin) + line()?).cmp(&Decimal::ZERO)
        }
        WagerType::Total => {
            let total = Decimal::from(home + away);
            match side {
                PickSide::Over => total.cmp(&line()?),
                _ => line()?.cmp(&total),
            }
        }
        WagerType::Moneyline => match side {
            PickSide::Home => home.cmp(&away),
            _ => away.cmp(&home),
        },
    };

    Ok(match ordering {
        Ordering::Greater => WagerStatus::Won,
        Ordering::Equal => WagerStatus::Push,
        Ordering::Less => WagerStatus::Lost,
    })
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    ledger: Arc<dyn WagerLedger>,
    bankroll: Arc<dyn Bankroll>,
    max_parallel: usize,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn WagerLedger>,
        bankroll: Arc<dyn Bankroll>,
        max_parallel: usize,
    ) -> Self {
        Self {
            ledger,
            bankroll,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Validate an event and sweep its game.
    pub async fn settle_event(&self, event: &GameEvent) -> Result<SettlementReport, WagerError> {
        let resolution = event.resolution()?;
        self.settle(event.game_id, resolution).await
    }

    /// Settle every pending wager on `game_id`. Safe to run repeatedly or
    /// concurrently: a wager is credited only by the sweep that moved it
    /// out of PENDING.
    pub async fn settle(
        &self,
        game_id: GameId,
        resolution: Resolution,
    ) -> Result<SettlementReport, WagerError> {
        let pending = self.ledger.find_pending_by_game(game_id).await?;
        info!(
            game_id,
            pending = pending.wagers.len(),
            unreadable = pending.unreadable.len(),
            resolution = ?resolution,
            "Settling game"
        );

        let outcomes: Vec<(WagerId, WagerOutcome)> = stream::iter(pending.wagers)
            .map(|wager| async move {
                let id = wager.id;
                (id, self.settle_wager(&wager, resolution).await)
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        let mut report = SettlementReport {
            game_id,
            inconsistent: pending.unreadable,
            ..Default::default()
        };
        for (wager_id, outcome) in outcomes {
            match outcome {
                WagerOutcome::Settled { status, payout } => {
                    report.count(status);
                    report.total_paid = report.total_paid.saturating_add(payout);
                }
                WagerOutcome::CreditFailed { status, reason } => {
                    report.count(status);
                    report.credit_failures.push(FlaggedWager { wager_id, reason });
                }
                WagerOutcome::AlreadySettled => report.already_settled += 1,
                WagerOutcome::Inconsistent(reason) => {
                    report.inconsistent.push(FlaggedWager { wager_id, reason })
                }
                WagerOutcome::Failed(reason) => report.failed.push(FlaggedWager { wager_id, reason }),
            }
        }

        info!(
            game_id,
            won = report.won,
            lost = report.lost,
            pushed = report.pushed,
            voided = report.voided,
            already_settled = report.already_settled,
            inconsistent = report.inconsistent.len(),
            failed = report.failed.len(),
            paid = format!("${:.2}", report.total_paid),
            "Settlement sweep complete"
        );

        Ok(report)
    }

    async fn settle_wager(&self, wager: &Wager, resolution: Resolution) -> WagerOutcome {
        let graded = grade(wager, resolution)
            .and_then(|status| Ok((status, odds::payout_for(status, wager.amount, wager.odds)?)));
        let (status, payout) = match graded {
            Ok(graded) => graded,
            Err(e) => {
                warn!(wager_id = %wager.id, game_id = wager.game_id, error = %e, "Wager left pending");
                return WagerOutcome::Inconsistent(e.to_string());
            }
        };

        let settlement = match Settlement::new(status, payout) {
            Ok(s) => s,
            Err(e) => return WagerOutcome::Inconsistent(e.to_string()),
        };

        match self.ledger.transition(wager.id, settlement).await {
            Ok(Transition::AlreadySettled) => {
                debug!(wager_id = %wager.id, "Already settled, skipping credit");
                WagerOutcome::AlreadySettled
            }
            Ok(Transition::Applied(settled)) => {
                debug!(wager = %settled, "Wager graded");
                if payout > Decimal::ZERO {
                    if let Err(e) = self.bankroll.credit(settled.account_id, payout).await {
                        error!(
                            wager_id = %settled.id,
                            account_id = settled.account_id,
                            payout = %payout,
                            error = %e,
                            "Credit failed after settlement; balance needs reconciliation"
                        );
                        return WagerOutcome::CreditFailed {
                            status,
                            reason: e.to_string(),
                        };
                    }
                }
                WagerOutcome::Settled { status, payout }
            }
            Err(e) => {
                warn!(wager_id = %wager.id, error = %e, "Transition failed");
                WagerOutcome::Failed(e.to_string())
            }
        }
    }
}

impl SettlementReport {
    fn count(&mut self, status: WagerStatus) {
        match status {
            WagerStatus::Won => self.won += 1,
            WagerStatus::Lost => self.lost += 1,
            WagerStatus::Push => self.pushed += 1,
            WagerStatus::Void => self.voided += 1,
            WagerStatus::Pending => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
