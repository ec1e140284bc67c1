//! Shared builders for integration tests.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use wagerbook::engine::{BookSettings, SimulatedOutcomes, Sportsbook};
use wagerbook::storage::{Bankroll, GameBook, WagerLedger};
use wagerbook::types::*;

pub fn book_over<S>(store: Arc<S>) -> Sportsbook
where
    S: Bankroll + WagerLedger + GameBook + 'static,
{
    Sportsbook::with_store(
        store,
        Arc::new(SimulatedOutcomes::new(Some(2024))),
        BookSettings {
            starting_bankroll: dec!(1000),
            max_parallel: 8,
        },
    )
}

/// A scheduled NBA game tomorrow with the Lakers–Warriors lines.
pub fn nba_game(id: GameId) -> Game {
    Game {
        id,
        home_team: "Los Angeles Lakers".into(),
        away_team: "Golden State Warriors".into(),
        sport: Sport::Nba,
        scheduled_time: Utc::now() + Duration::days(1),
        status: GameStatus::Scheduled,
        home_spread: Some(dec!(-3.5)),
        away_spread: Some(dec!(3.5)),
        total_line: Some(dec!(225.5)),
        home_moneyline: Some(-165),
        away_moneyline: Some(145),
        over_odds: Some(-110),
        under_odds: Some(-110),
        final_home_score: None,
        final_away_score: None,
    }
}

pub fn spread(account_id: AccountId, game_id: GameId, side: PickSide, line: Decimal, amount: Decimal) -> PlacementRequest {
    PlacementRequest {
        account_id,
        game_id,
        wager_type: WagerType::Spread,
        pick: WagerPick { side, line: Some(line) },
        amount,
        odds: -110,
        prediction_id: None,
    }
}

pub fn total(account_id: AccountId, game_id: GameId, side: PickSide, line: Decimal, amount: Decimal) -> PlacementRequest {
    PlacementRequest {
        wager_type: WagerType::Total,
        ..spread(account_id, game_id, side, line, amount)
    }
}

pub fn moneyline(account_id: AccountId, game_id: GameId, side: PickSide, odds: i32, amount: Decimal) -> PlacementRequest {
    PlacementRequest {
        account_id,
        game_id,
        wager_type: WagerType::Moneyline,
        pick: WagerPick { side, line: None },
        amount,
        odds,
        prediction_id: None,
    }
}
