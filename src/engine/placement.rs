//! Placement desk.
//!
//! Validates a placement request against the game snapshot and hands the
//! frozen wager to the ledger, which debits and inserts as one unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::odds;
use crate::storage::{GameBook, WagerLedger};
use crate::types::{
    check_amount, PlacementReceipt, PlacementRequest, Wager, WagerError, WagerPick, WagerStatus,
};

pub struct PlacementDesk {
    games: Arc<dyn GameBook>,
    ledger: Arc<dyn WagerLedger>,
}

impl PlacementDesk {
    pub fn new(games: Arc<dyn GameBook>, ledger: Arc<dyn WagerLedger>) -> Self {
        Self { games, ledger }
    }

    /// Place a single-leg wager. `now` is the instant the game must not
    /// have started by.
    pub async fn place(
        &self,
        req: &PlacementRequest,
        now: DateTime<Utc>,
    ) -> Result<PlacementReceipt, WagerError> {
        let pick = validate_request(req)?;

        let game = self
            .games
            .game(req.game_id)
            .await?
            .ok_or(WagerError::GameNotFound(req.game_id))?;
        if !game.is_open_for_wagers(now) {
            warn!(
                game_id = game.id,
                status = %game.status,
                scheduled = %game.scheduled_time,
                "Rejected wager on closed game"
            );
            return Err(WagerError::GameAlreadyStarted(game.id));
        }

        let wager = Wager {
            id: Uuid::new_v4(),
            account_id: req.account_id,
            game_id: req.game_id,
            prediction_id: req.prediction_id,
            wager_type: req.wager_type,
            pick,
            amount: req.amount,
            odds: req.odds,
            status: WagerStatus::Pending,
            payout: None,
            created_at: now,
            settled_at: None,
        };

        let new_balance = self.ledger.create(&wager).await?;

        info!(
            wager_id = %wager.id,
            account_id = wager.account_id,
            game = %game,
            pick = %wager.pick,
            wager_type = %wager.wager_type,
            amount = format!("${:.2}", wager.amount),
            odds = wager.odds,
            new_balance = format!("${:.2}", new_balance),
            "Wager placed"
        );

        Ok(PlacementReceipt { wager, new_balance })
    }
}

/// Request-level checks that need no store access. Returns the pick to
/// freeze on the wager.
fn validate_request(req: &PlacementRequest) -> Result<WagerPick, WagerError> {
    if req.amount <= Decimal::ZERO {
        return Err(WagerError::Validation(format!(
            "wager amount must be positive, got {}",
            req.amount
        )));
    }
    check_amount("wager amount", req.amount)?;
    // Also rejects zero odds; must hold before any money moves.
    odds::payout_for_win(req.amount, req.odds)?;
    if !req.wager_type.accepts(req.pick.side) {
        return Err(WagerError::Validation(format!(
            "{} is not a valid side for a {} wager",
            req.pick.side, req.wager_type
        )));
    }

    if req.wager_type.requires_line() {
        if req.pick.line.is_none() {
            return Err(WagerError::Validation(format!(
                "a {} wager requires a line value",
                req.wager_type
            )));
        }
        Ok(req.pick)
    } else {
        Ok(WagerPick { side: req.pick.side, line: None })
    }
}
