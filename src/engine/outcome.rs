//! Outcome sources for simulated games.
//!
//! Kept outside the settlement core: the engine only ever sees the final
//! event a source produces.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Mutex;

use crate::types::{Game, Sport, WagerError};

#[cfg_attr(test, mockall::automock)]
pub trait OutcomeSource: Send + Sync {
    /// Final `(home, away)` score for a game.
    fn final_score(&self, game: &Game) -> Result<(u32, u32), WagerError>;
}

/// Typical per-team score and the noise band around it.
fn scoring_profile(sport: Sport) -> (f64, f64) {
    match sport {
        Sport::Nba => (110.0, 20.0),
        Sport::Nfl => (24.0, 10.0),
        Sport::Mlb => (5.0, 3.0),
        Sport::Nhl => (3.0, 2.0),
        Sport::Ncaaf => (28.0, 12.0),
        Sport::Ncaab => (72.0, 15.0),
        Sport::Other => (100.0, 20.0),
    }
}

/// Random scores centred on the sport's base, with the favourite shifted by
/// half the home spread.
pub struct SimulatedOutcomes {
    rng: Mutex<StdRng>,
}

impl SimulatedOutcomes {
    /// `Some(seed)` gives a reproducible sequence.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }
}

impl OutcomeSource for SimulatedOutcomes {
    fn final_score(&self, game: &Game) -> Result<(u32, u32), WagerError> {
        let (base, noise) = scoring_profile(game.sport);
        // A negative home spread means the home side is favoured.
        let shift = game.home_spread.and_then(|s| s.to_f64()).unwrap_or(0.0) / 2.0;

        let mut rng = self
            .rng
            .lock()
            .map_err(|_| WagerError::Storage("outcome rng lock poisoned".to_string()))?;
        let home = base - shift + rng.gen_range(-noise..=noise);
        let away = base + shift + rng.gen_range(-noise..=noise);
        Ok((to_score(home), to_score(away)))
    }
}

fn to_score(raw: f64) -> u32 {
    raw.round().max(0.0) as u32
}
