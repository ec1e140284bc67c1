//! The sportsbook: composition root over the stores and engine parts.
//!
//! Everything is injected. There is no global state, so tests and the
//! binary build their own book over whichever store they want.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::outcome::OutcomeSource;
use crate::engine::placement::PlacementDesk;
use crate::engine::settlement::{SettlementEngine, SettlementReport};
use crate::engine::stats::{BettingStats, StatsAggregator};
use crate::storage::{Bankroll, GameBook, WagerLedger};
use crate::types::{
    Account, AccountId, Game, GameEvent, GameId, PlacementReceipt, PlacementRequest,
    check_amount, Wager, WagerError,
};

/// Tunables the book needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookSettings {
    pub starting_bankroll: Decimal,
    pub max_parallel: usize,
}

impl Default for BookSettings {
    fn default() -> Self {
        Self {
            starting_bankroll: Decimal::from(1000),
            max_parallel: 8,
        }
    }
}

/// A game after an event was applied, with the sweep it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct GameSettlement {
    pub game: Game,
    pub report: SettlementReport,
}

pub struct Sportsbook {
    bankroll: Arc<dyn Bankroll>,
    ledger: Arc<dyn WagerLedger>,
    games: Arc<dyn GameBook>,
    outcomes: Arc<dyn OutcomeSource>,
    desk: PlacementDesk,
    settlement: SettlementEngine,
    settings: BookSettings,
}

impl Sportsbook {
    pub fn new(
        bankroll: Arc<dyn Bankroll>,
        ledger: Arc<dyn WagerLedger>,
        games: Arc<dyn GameBook>,
        outcomes: Arc<dyn OutcomeSource>,
        settings: BookSettings,
    ) -> Self {
        let desk = PlacementDesk::new(games.clone(), ledger.clone());
        let settlement = SettlementEngine::new(ledger.clone(), bankroll.clone(), settings.max_parallel);
        Self {
            bankroll,
            ledger,
            games,
            outcomes,
            desk,
            settlement,
            settings,
        }
    }

    /// Build over one store that implements all three store traits.
    pub fn with_store<S>(store: Arc<S>, outcomes: Arc<dyn OutcomeSource>, settings: BookSettings) -> Self
    where
        S: Bankroll + WagerLedger + GameBook + 'static,
    {
        Self::new(store.clone(), store.clone(), store, outcomes, settings)
    }

    // -- Accounts ---------------------------------------------------------

    /// Open an account. Without an explicit balance the configured starting
    /// bankroll is used.
    pub async fn open_account(&self, starting_balance: Option<Decimal>) -> Result<Account, WagerError> {
        let balance = starting_balance.unwrap_or(self.settings.starting_bankroll);
        if balance < Decimal::ZERO {
            return Err(WagerError::Validation(format!("invalid starting balance {balance}")));
        }
        check_amount("starting balance", balance)?;
        let account = self.bankroll.open_account(balance).await?;
        info!(account_id = account.id, balance = format!("${:.2}", account.balance), "Account opened");
        Ok(account)
    }

    pub async fn account(&self, id: AccountId) -> Result<Account, WagerError> {
        self.bankroll.account(id).await
    }

    pub async fn stats(&self, account_id: AccountId) -> Result<BettingStats, WagerError> {
        self.bankroll.account(account_id).await?;
        let rows = self.ledger.stats_view(account_id).await?;
        StatsAggregator::summarize(&rows)
    }

    /// Newest first.
    pub async fn history(&self, account_id: AccountId, limit: usize) -> Result<Vec<Wager>, WagerError> {
        self.bankroll.account(account_id).await?;
        self.ledger.list_by_account(account_id, limit).await
    }

    // -- Wagers -----------------------------------------------------------

    pub async fn place_wager(&self, req: &PlacementRequest) -> Result<PlacementReceipt, WagerError> {
        self.desk.place(req, Utc::now()).await
    }

    // -- Games ------------------------------------------------------------

    pub async fn upsert_game(&self, game: &Game) -> Result<(), WagerError> {
        self.games.upsert_game(game).await
    }

    pub async fn game(&self, id: GameId) -> Result<Game, WagerError> {
        self.games.game(id).await?.ok_or(WagerError::GameNotFound(id))
    }

    pub async fn upcoming_games(&self, limit: usize) -> Result<Vec<Game>, WagerError> {
        self.games.upcoming_games(Utc::now(), limit).await
    }

    /// Record a final/postponed/canceled event and settle the game. A
    /// repeated identical event re-runs the sweep, which finds nothing
    /// pending.
    pub async fn handle_game_event(&self, event: &GameEvent) -> Result<GameSettlement, WagerError> {
        let resolution = event.resolution()?;
        let game = match self.games.record_event(event).await {
            Ok(game) => game,
            Err(e) => {
                warn!(game_id = event.game_id, status = %event.status, error = %e, "Game event rejected");
                return Err(e);
            }
        };
        info!(game = %game, "Game event recorded");

        let report = self.settlement.settle(game.id, resolution).await?;
        Ok(GameSettlement { game, report })
    }

    /// Draw a final score from the outcome source and settle with it.
    pub async fn simulate_game(&self, id: GameId) -> Result<GameSettlement, WagerError> {
        let game = self.game(id).await?;
        if game.status.is_resolved() {
            return Err(WagerError::ResultConflict {
                game_id: id,
                message: format!("game is already {}", game.status),
            });
        }

        let (home, away) = self.outcomes.final_score(&game)?;
        info!(game_id = id, home, away, "Simulated final score");
        self.handle_game_event(&GameEvent::final_score(id, home, away)).await
    }
}
