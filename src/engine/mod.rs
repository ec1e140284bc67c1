//! Core engine: odds math, placement, settlement and stats, composed by
//! the [`book::Sportsbook`].

pub mod odds;
pub mod placement;
pub mod settlement;
pub mod stats;
pub mod outcome;
pub mod book;

pub use book::{BookSettings, GameSettlement, Sportsbook};
pub use outcome::{OutcomeSource, SimulatedOutcomes};
pub use settlement::{grade, FlaggedWager, SettlementEngine, SettlementReport};
pub use stats::{BettingStats, StatsAggregator};
