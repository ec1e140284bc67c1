//! Demo schedule seeded at startup when `book.seed_demo_games` is set.

use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;

use crate::types::{Game, GameStatus, Sport};

/// Three scheduled games one, two and three days after `now`.
pub fn demo_games(now: DateTime<Utc>) -> Vec<Game> {
    let scheduled = |id, home: &str, away: &str, sport, days| Game {
        id,
        home_team: home.to_string(),
        away_team: away.to_string(),
        sport,
        scheduled_time: now + Duration::days(days),
        status: GameStatus::Scheduled,
        home_spread: None,
        away_spread: None,
        total_line: None,
        home_moneyline: None,
        away_moneyline: None,
        over_odds: None,
        under_odds: None,
        final_home_score: None,
        final_away_score: None,
    };

    vec![
        Game {
            home_spread: Some(dec!(-3.5)),
            away_spread: Some(dec!(3.5)),
            total_line: Some(dec!(225.5)),
            home_moneyline: Some(-165),
            away_moneyline: Some(145),
            over_odds: Some(-110),
            under_odds: Some(-110),
            ..scheduled(1, "Los Angeles Lakers", "Golden State Warriors", Sport::Nba, 1)
        },
        Game {
            home_spread: Some(dec!(-7.0)),
            away_spread: Some(dec!(7.0)),
            total_line: Some(dec!(45.5)),
            home_moneyline: Some(-280),
            away_moneyline: Some(230),
            over_odds: Some(-115),
            under_odds: Some(-105),
            ..scheduled(2, "Dallas Cowboys", "New York Giants", Sport::Nfl, 2)
        },
        Game {
            home_spread: Some(dec!(-5.5)),
            away_spread: Some(dec!(5.5)),
            total_line: Some(dec!(218.0)),
            home_moneyline: Some(-220),
            away_moneyline: Some(180),
            over_odds: Some(-108),
            under_odds: Some(-112),
            ..scheduled(3, "Boston Celtics", "Miami Heat", Sport::Nba, 3)
        },
    ]
}
