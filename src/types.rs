//! Shared types for the WAGERBOOK sportsbook.
//!
//! These types form the data model used across all modules.
//! Money is always `rust_decimal::Decimal` in the currency's minor unit
//! (two places); odds are American-format signed integers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type AccountId = i64;
pub type GameId = i64;
pub type WagerId = Uuid;

/// Number of decimal places in the currency's minor unit.
pub const MONEY_SCALE: u32 = 2;

/// Largest stake or starting balance accepted. The winning payout at any
/// `i32` price then still fits in `Decimal` and in `i64` cents.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Checks a money amount supplied from outside: at most two decimal places
/// and no larger than [`MAX_AMOUNT`]. Sign checks are left to the caller.
pub fn check_amount(what: &str, amount: Decimal) -> Result<(), WagerError> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(WagerError::Validation(format!(
            "{what} {amount} has more than {MONEY_SCALE} decimal places"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(WagerError::Validation(format!(
            "{what} {amount} exceeds the limit of {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A bankroll account. `balance` is only ever changed by the store's
/// debit/credit operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account #{} (balance ${:.2})", self.id, self.balance)
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    Nba,
    Nfl,
    Mlb,
    Nhl,
    Ncaaf,
    Ncaab,
    Other,
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sport::Nba => "NBA",
            Sport::Nfl => "NFL",
            Sport::Mlb => "MLB",
            Sport::Nhl => "NHL",
            Sport::Ncaaf => "NCAAF",
            Sport::Ncaab => "NCAAB",
            Sport::Other => "OTHER",
        };
        write!(f, "{s}")
    }
}

/// Case-insensitive. Unknown names are an error, not `Other`.
impl std::str::FromStr for Sport {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nba" => Ok(Sport::Nba),
            "nfl" => Ok(Sport::Nfl),
            "mlb" => Ok(Sport::Mlb),
            "nhl" => Ok(Sport::Nhl),
            "ncaaf" | "cfb" => Ok(Sport::Ncaaf),
            "ncaab" | "cbb" => Ok(Sport::Ncaab),
            "other" => Ok(Sport::Other),
            _ => Err(WagerError::Validation(format!("unknown sport: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
    Postponed,
    Canceled,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
            GameStatus::Canceled => "canceled",
        }
    }

    /// Final, postponed or canceled: the game's wagers have been swept.
    pub fn is_resolved(&self) -> bool {
        matches!(self, GameStatus::Final | GameStatus::Postponed | GameStatus::Canceled)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GameStatus {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(GameStatus::Scheduled),
            "live" | "in_progress" => Ok(GameStatus::Live),
            "final" => Ok(GameStatus::Final),
            "postponed" => Ok(GameStatus::Postponed),
            "canceled" | "cancelled" => Ok(GameStatus::Canceled),
            _ => Err(WagerError::Validation(format!("unknown game status: {s}"))),
        }
    }
}

/// A game snapshot as published by the schedule/line feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub home_team: String,
    pub away_team: String,
    pub sport: Sport,
    pub scheduled_time: DateTime<Utc>,
    pub status: GameStatus,
    pub home_spread: Option<Decimal>,
    pub away_spread: Option<Decimal>,
    pub total_line: Option<Decimal>,
    pub home_moneyline: Option<i32>,
    pub away_moneyline: Option<i32>,
    #[serde(default)]
    pub over_odds: Option<i32>,
    #[serde(default)]
    pub under_odds: Option<i32>,
    #[serde(default)]
    pub final_home_score: Option<u32>,
    #[serde(default)]
    pub final_away_score: Option<u32>,
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({}, {})",
            self.sport, self.away_team, self.home_team, self.status, self.scheduled_time,
        )?;
        if let (Some(h), Some(a)) = (self.final_home_score, self.final_away_score) {
            write!(f, " {a}-{h}")?;
        }
        Ok(())
    }
}

impl Game {
    /// Whether wagers may still be placed at `now`.
    pub fn is_open_for_wagers(&self, now: DateTime<Utc>) -> bool {
        self.status == GameStatus::Scheduled && self.scheduled_time > now
    }

    /// Final scores must be present iff the game is final.
    pub fn validate(&self) -> Result<(), WagerError> {
        let has_scores = self.final_home_score.is_some() || self.final_away_score.is_some();
        match self.status {
            GameStatus::Final => {
                if self.final_home_score.is_none() || self.final_away_score.is_none() {
                    return Err(WagerError::Validation(format!(
                        "game {} is final but missing a score",
                        self.id
                    )));
                }
            }
            _ if has_scores => {
                return Err(WagerError::Validation(format!(
                    "game {} carries scores while {}",
                    self.id, self.status
                )));
            }
            _ => {}
        }
        if self.home_team.trim().is_empty() || self.away_team.trim().is_empty() {
            return Err(WagerError::Validation(format!(
                "game {} is missing a team name",
                self.id
            )));
        }
        Ok(())
    }

    /// The currently published line and price for a pick, if the feed
    /// offers one. Spread and total picks price at -110 when the feed
    /// carries no explicit juice.
    pub fn quote(&self, wager_type: WagerType, side: PickSide) -> Option<(Option<Decimal>, i32)> {
        match (wager_type, side) {
            (WagerType::Spread, PickSide::Home) => self.home_spread.map(|l| (Some(l), -110)),
            (WagerType::Spread, PickSide::Away) => self.away_spread.map(|l| (Some(l), -110)),
            (WagerType::Total, PickSide::Over) => self
                .total_line
                .map(|l| (Some(l), self.over_odds.unwrap_or(-110))),
            (WagerType::Total, PickSide::Under) => self
                .total_line
                .map(|l| (Some(l), self.under_odds.unwrap_or(-110))),
            (WagerType::Moneyline, PickSide::Home) => self.home_moneyline.map(|o| (None, o)),
            (WagerType::Moneyline, PickSide::Away) => self.away_moneyline.map(|o| (None, o)),
            _ => None,
        }
    }
}

/// A result pushed by the score feed (or a simulator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub game_id: GameId,
    pub status: GameStatus,
    #[serde(default)]
    pub final_home_score: Option<u32>,
    #[serde(default)]
    pub final_away_score: Option<u32>,
}

/// What a validated game event means for the wagers on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Final { home: u32, away: u32 },
    Void,
}

impl GameEvent {
    pub fn final_score(game_id: GameId, home: u32, away: u32) -> Self {
        Self {
            game_id,
            status: GameStatus::Final,
            final_home_score: Some(home),
            final_away_score: Some(away),
        }
    }

    pub fn postponed(game_id: GameId) -> Self {
        Self {
            game_id,
            status: GameStatus::Postponed,
            final_home_score: None,
            final_away_score: None,
        }
    }

    pub fn canceled(game_id: GameId) -> Self {
        Self {
            game_id,
            status: GameStatus::Canceled,
            final_home_score: None,
            final_away_score: None,
        }
    }

    pub fn resolution(&self) -> Result<Resolution, WagerError> {
        match (self.status, self.final_home_score, self.final_away_score) {
            (GameStatus::Final, Some(home), Some(away)) => Ok(Resolution::Final { home, away }),
            (GameStatus::Final, _, _) => Err(WagerError::Validation(format!(
                "final event for game {} requires both scores",
                self.game_id
            ))),
            (GameStatus::Postponed | GameStatus::Canceled, None, None) => Ok(Resolution::Void),
            (GameStatus::Postponed | GameStatus::Canceled, _, _) => Err(WagerError::Validation(
                format!("{} event for game {} must not carry scores", self.status, self.game_id),
            )),
            (other, _, _) => Err(WagerError::Validation(format!(
                "{other} is not a settlement event"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerType {
    Spread,
    Total,
    Moneyline,
}

impl WagerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerType::Spread => "spread",
            WagerType::Total => "total",
            WagerType::Moneyline => "moneyline",
        }
    }

    pub fn accepts(&self, side: PickSide) -> bool {
        match self {
            WagerType::Spread | WagerType::Moneyline => {
                matches!(side, PickSide::Home | PickSide::Away)
            }
            WagerType::Total => matches!(side, PickSide::Over | PickSide::Under),
        }
    }

    pub fn requires_line(&self) -> bool {
        !matches!(self, WagerType::Moneyline)
    }
}

impl fmt::Display for WagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WagerType {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spread" => Ok(WagerType::Spread),
            "total" | "over_under" => Ok(WagerType::Total),
            "moneyline" | "ml" => Ok(WagerType::Moneyline),
            _ => Err(WagerError::Validation(format!("unknown wager type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickSide {
    Home,
    Away,
    Over,
    Under,
}

impl PickSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickSide::Home => "home",
            PickSide::Away => "away",
            PickSide::Over => "over",
            PickSide::Under => "under",
        }
    }
}

impl fmt::Display for PickSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PickSide {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" => Ok(PickSide::Home),
            "away" => Ok(PickSide::Away),
            "over" => Ok(PickSide::Over),
            "under" => Ok(PickSide::Under),
            _ => Err(WagerError::Validation(format!("unknown pick side: {s}"))),
        }
    }
}

/// The side taken plus the line snapshot at placement time.
/// `line` is signed from the picked side's perspective for spreads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerPick {
    pub side: PickSide,
    #[serde(rename = "line_value", default)]
    pub line: Option<Decimal>,
}

impl fmt::Display for WagerPick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) if line > Decimal::ZERO => write!(f, "{} +{line}", self.side),
            Some(line) => write!(f, "{} {line}", self.side),
            None => write!(f, "{}", self.side),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Push,
    Void,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
            WagerStatus::Push => "push",
            WagerStatus::Void => "void",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WagerStatus::Pending)
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WagerStatus {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WagerStatus::Pending),
            "won" => Ok(WagerStatus::Won),
            "lost" => Ok(WagerStatus::Lost),
            "push" => Ok(WagerStatus::Push),
            "void" => Ok(WagerStatus::Void),
            _ => Err(WagerError::DataInconsistency(format!("unknown wager status: {s}"))),
        }
    }
}

/// A single-leg wager. Line and odds are a frozen copy taken at placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub account_id: AccountId,
    pub game_id: GameId,
    pub prediction_id: Option<i64>,
    pub wager_type: WagerType,
    pub pick: WagerPick,
    pub amount: Decimal,
    pub odds: i32,
    pub status: WagerStatus,
    pub payout: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} game={} {} {} ${:.2} @ {:+} [{}]",
            self.id, self.game_id, self.wager_type, self.pick, self.amount, self.odds, self.status,
        )?;
        if let Some(payout) = self.payout {
            write!(f, " paid ${payout:.2}")?;
        }
        Ok(())
    }
}

impl Wager {
    pub fn is_pending(&self) -> bool {
        self.status == WagerStatus::Pending
    }

    /// Apply a terminal settlement to a local copy. Stores call this inside
    /// their compare-and-swap.
    pub(crate) fn apply(&mut self, settlement: &Settlement) {
        self.status = settlement.status;
        self.payout = Some(settlement.payout);
        self.settled_at = Some(settlement.settled_at);
    }
}

/// The terminal state a wager is being moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub status: WagerStatus,
    pub payout: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(status: WagerStatus, payout: Decimal) -> Result<Self, WagerError> {
        if !status.is_terminal() {
            return Err(WagerError::Validation(
                "cannot settle a wager into pending".to_string(),
            ));
        }
        if payout < Decimal::ZERO {
            return Err(WagerError::Validation(format!("negative payout {payout}")));
        }
        Ok(Self {
            status,
            payout,
            settled_at: Utc::now(),
        })
    }
}

/// Outcome of a conditional PENDING → terminal update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(Wager),
    /// Someone else already settled this wager. Not an error.
    AlreadySettled,
}

/// A wager a settlement sweep could not settle, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedWager {
    pub wager_id: WagerId,
    pub reason: String,
}

/// Pending wagers on one game. Rows the store holds but cannot decode
/// are returned in `unreadable` so the sweep can report them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingWagers {
    pub wagers: Vec<Wager>,
    pub unreadable: Vec<FlaggedWager>,
}

/// The columns the stats aggregator needs from each wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsRow {
    pub status: WagerStatus,
    pub amount: Decimal,
    pub payout: Option<Decimal>,
}

impl From<&Wager> for StatsRow {
    fn from(w: &Wager) -> Self {
        Self {
            status: w.status,
            amount: w.amount,
            payout: w.payout,
        }
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub account_id: AccountId,
    pub game_id: GameId,
    pub wager_type: WagerType,
    pub pick: WagerPick,
    pub amount: Decimal,
    pub odds: i32,
    #[serde(default)]
    pub prediction_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementReceipt {
    pub wager: Wager,
    pub new_balance: Decimal,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WagerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Game not found: {0}")]
    GameNotFound(GameId),

    #[error("Wager not found: {0}")]
    WagerNotFound(WagerId),

    #[error("Game {0} has already started or is not open for wagers")]
    GameAlreadyStarted(GameId),

    #[error("Invalid odds: {0} (American odds cannot be zero)")]
    InvalidOdds(i32),

    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    #[error("Result conflict for game {game_id}: {message}")]
    ResultConflict { game_id: GameId, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WagerError {
    /// Short machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            WagerError::Validation(_) => "validation_error",
            WagerError::InsufficientFunds { .. } => "insufficient_funds",
            WagerError::AccountNotFound(_) => "account_not_found",
            WagerError::GameNotFound(_) => "game_not_found",
            WagerError::WagerNotFound(_) => "wager_not_found",
            WagerError::GameAlreadyStarted(_) => "game_already_started",
            WagerError::InvalidOdds(_) => "invalid_odds",
            WagerError::DataInconsistency(_) => "data_inconsistency",
            WagerError::ResultConflict { .. } => "result_conflict",
            WagerError::Storage(_) => "storage_error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
