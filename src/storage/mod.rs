//! Persistence layer.
//!
//! Defines the transactional store traits the engine is written against:
//! - `Bankroll`: account balances (atomic debit/credit)
//! - `WagerLedger`: wager records with a compare-and-swap settlement
//! - `GameBook`: game snapshots pushed by the feed
//!
//! The store owns atomicity. Callers never read a balance or status and
//! write it back.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{
    Account, AccountId, Game, GameEvent, GameId, GameStatus, PendingWagers, Settlement, StatsRow,
    Transition, Wager, WagerError, WagerId,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bankroll: Send + Sync {
    /// Register a new account holding `starting_balance`.
    async fn open_account(&self, starting_balance: Decimal) -> Result<Account, WagerError>;

    async fn account(&self, id: AccountId) -> Result<Account, WagerError>;

    /// Atomically decrement. Fails with `InsufficientFunds` rather than go
    /// negative. Returns the new balance.
    async fn debit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError>;

    /// Atomically increment. Returns the new balance.
    async fn credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WagerLedger: Send + Sync {
    /// Insert a PENDING wager and debit its stake from the owning account
    /// as one unit. The game must still be scheduled and start after
    /// `wager.created_at`, checked inside the same unit, otherwise
    /// `GameAlreadyStarted`. Returns the account's new balance.
    async fn create(&self, wager: &Wager) -> Result<Decimal, WagerError>;

    async fn get(&self, id: WagerId) -> Result<Wager, WagerError>;

    async fn find_pending_by_game(&self, game_id: GameId) -> Result<PendingWagers, WagerError>;

    /// Move a PENDING wager to a terminal status. Returns
    /// `Transition::AlreadySettled` if the wager is no longer pending.
    async fn transition(
        &self,
        id: WagerId,
        settlement: Settlement,
    ) -> Result<Transition, WagerError>;

    /// Newest first.
    async fn list_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Wager>, WagerError>;

    async fn stats_view(&self, account_id: AccountId) -> Result<Vec<StatsRow>, WagerError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameBook: Send + Sync {
    /// Insert or replace a feed snapshot. Snapshots cannot resolve a game
    /// or alter a resolved one; that goes through `record_event`.
    async fn upsert_game(&self, game: &Game) -> Result<(), WagerError>;

    async fn game(&self, id: GameId) -> Result<Option<Game>, WagerError>;

    /// Scheduled games starting after `now`, soonest first.
    async fn upcoming_games(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Game>, WagerError>;

    /// Apply a settlement event and return the updated game.
    async fn record_event(&self, event: &GameEvent) -> Result<Game, WagerError>;
}

/// Shared rule for applying an event to a stored game. A final result can
/// be repeated verbatim but never changed, and a final game cannot be
/// voided afterwards.
pub(crate) fn apply_event(game: &mut Game, event: &GameEvent) -> Result<(), WagerError> {
    // Validates score presence for the event status.
    event.resolution()?;

    match game.status {
        GameStatus::Final => {
            let same = event.status == game.status
                && event.final_home_score == game.final_home_score
                && event.final_away_score == game.final_away_score;
            if !same {
                return Err(WagerError::ResultConflict {
                    game_id: game.id,
                    message: format!(
                        "already final at {}-{}",
                        game.final_home_score.unwrap_or_default(),
                        game.final_away_score.unwrap_or_default()
                    ),
                });
            }
        }
        GameStatus::Postponed | GameStatus::Canceled if event.status == GameStatus::Final => {
            return Err(WagerError::ResultConflict {
                game_id: game.id,
                message: format!("game is {}; reschedule it before posting a result", game.status),
            });
        }
        _ => {}
    }

    game.status = event.status;
    game.final_home_score = event.final_home_score;
    game.final_away_score = event.final_away_score;
    Ok(())
}

/// Shared rule for feed snapshots. A snapshot may update lines and
/// schedule freely, and may reopen a postponed or canceled game, but it
/// cannot move a game into a resolved status or change a final result.
pub(crate) fn check_snapshot(stored: Option<&Game>, incoming: &Game) -> Result<(), WagerError> {
    incoming.validate()?;
    let same_result = |g: &Game| {
        g.status == incoming.status
            && g.final_home_score == incoming.final_home_score
            && g.final_away_score == incoming.final_away_score
    };

    if let Some(g) = stored.filter(|g| g.status == GameStatus::Final) {
        if !same_result(g) {
            return Err(WagerError::ResultConflict {
                game_id: g.id,
                message: "a final result cannot be changed by a snapshot".to_string(),
            });
        }
    }
    if incoming.status.is_resolved() && !stored.is_some_and(same_result) {
        return Err(WagerError::ResultConflict {
            game_id: incoming.id,
            message: format!("post a game event to mark the game {}", incoming.status),
        });
    }
    Ok(())
}
