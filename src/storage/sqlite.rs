//! SQLite store (sqlx).
//!
//! Money is kept in integer cents so debit and credit are single
//! conditional `UPDATE` statements. Line values are decimal text and
//! timestamps RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{apply_event, check_snapshot, Bankroll, GameBook, WagerLedger};
use crate::types::{
    Account, AccountId, FlaggedWager, Game, GameEvent, GameId, GameStatus, PendingWagers,
    PickSide, Settlement, Sport, StatsRow, Transition, Wager, WagerError, WagerId, WagerPick,
    WagerStatus, WagerType, MONEY_SCALE,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        balance_cents INTEGER NOT NULL CHECK (balance_cents >= 0),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS games (
        id INTEGER PRIMARY KEY,
        home_team TEXT NOT NULL,
        away_team TEXT NOT NULL,
        sport TEXT NOT NULL,
        scheduled_time TEXT NOT NULL,
        status TEXT NOT NULL,
        home_spread TEXT,
        away_spread TEXT,
        total_line TEXT,
        home_moneyline INTEGER,
        away_moneyline INTEGER,
        over_odds INTEGER,
        under_odds INTEGER,
        final_home_score INTEGER,
        final_away_score INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS wagers (
        id TEXT PRIMARY KEY,
        account_id INTEGER NOT NULL REFERENCES accounts (id),
        game_id INTEGER NOT NULL,
        prediction_id INTEGER,
        wager_type TEXT NOT NULL,
        pick_side TEXT NOT NULL,
        line_value TEXT,
        amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
        odds INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        payout_cents INTEGER,
        created_at TEXT NOT NULL,
        settled_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_wagers_game_status ON wagers (game_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_wagers_account ON wagers (account_id, created_at)",
];

const WAGER_COLUMNS: &str = "id, account_id, game_id, prediction_id, wager_type, pick_side, \
    line_value, amount_cents, odds, status, payout_cents, created_at, settled_at";

const GAME_COLUMNS: &str = "id, home_team, away_team, sport, scheduled_time, status, \
    home_spread, away_spread, total_line, home_moneyline, away_moneyline, over_odds, \
    under_odds, final_home_score, final_away_score";

impl From<sqlx::Error> for WagerError {
    fn from(e: sqlx::Error) -> Self {
        WagerError::Storage(e.to_string())
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, WagerError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each in-memory connection is its own database, so pin exactly one.
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "SQLite store ready");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, WagerError> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), WagerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn to_cents(amount: Decimal) -> Result<i64, WagerError> {
    let cents = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| WagerError::Validation(format!("{amount} is out of range")))?;
    if !cents.fract().is_zero() {
        return Err(WagerError::Validation(format!(
            "{amount} has more precision than the currency allows"
        )));
    }
    cents
        .to_i64()
        .ok_or_else(|| WagerError::Validation(format!("{amount} is out of range")))
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, MONEY_SCALE)
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, WagerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WagerError::DataInconsistency(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_decimal(raw: Option<String>) -> Result<Option<Decimal>, WagerError> {
    raw.map(|s| {
        Decimal::from_str(s.trim())
            .map_err(|e| WagerError::DataInconsistency(format!("bad decimal {s:?}: {e}")))
    })
    .transpose()
}

fn to_score(raw: Option<i64>) -> Result<Option<u32>, WagerError> {
    raw.map(|v| {
        u32::try_from(v).map_err(|_| WagerError::DataInconsistency(format!("bad score {v}")))
    })
    .transpose()
}

fn wager_from_row(row: &SqliteRow) -> Result<Wager, WagerError> {
    let raw_id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&raw_id)
        .map_err(|e| WagerError::DataInconsistency(format!("bad wager id {raw_id:?}: {e}")))?;

    // A non-numeric line is kept as "no line" so grading flags the wager
    // instead of the whole game failing to load.
    let raw_line: Option<String> = row.try_get("line_value")?;
    let line = match raw_line {
        Some(raw) => match Decimal::from_str(raw.trim()) {
            Ok(line) => Some(line),
            Err(_) => {
                warn!(wager_id = %id, line_value = %raw, "Stored line is not numeric");
                None
            }
        },
        None => None,
    };

    let wager_type: String = row.try_get("wager_type")?;
    let side: String = row.try_get("pick_side")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let settled_at: Option<String> = row.try_get("settled_at")?;
    let odds: i64 = row.try_get("odds")?;

    Ok(Wager {
        id,
        account_id: row.try_get("account_id")?,
        game_id: row.try_get("game_id")?,
        prediction_id: row.try_get("prediction_id")?,
        wager_type: WagerType::from_str(&wager_type)
            .map_err(|e| WagerError::DataInconsistency(e.to_string()))?,
        pick: WagerPick {
            side: PickSide::from_str(&side)
                .map_err(|e| WagerError::DataInconsistency(e.to_string()))?,
            line,
        },
        amount: from_cents(row.try_get("amount_cents")?),
        odds: i32::try_from(odds)
            .map_err(|_| WagerError::DataInconsistency(format!("bad odds {odds}")))?,
        status: WagerStatus::from_str(&status)?,
        payout: row.try_get::<Option<i64>, _>("payout_cents")?.map(from_cents),
        created_at: parse_ts(&created_at)?,
        settled_at: settled_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn game_from_row(row: &SqliteRow) -> Result<Game, WagerError> {
    let sport: String = row.try_get("sport")?;
    let status: String = row.try_get("status")?;
    let scheduled: String = row.try_get("scheduled_time")?;
    let odds = |col: &str| -> Result<Option<i32>, WagerError> {
        row.try_get::<Option<i64>, _>(col)?
            .map(|v| {
                i32::try_from(v).map_err(|_| WagerError::DataInconsistency(format!("bad odds {v}")))
            })
            .transpose()
    };

    Ok(Game {
        id: row.try_get("id")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        sport: Sport::from_str(&sport).map_err(|e| WagerError::DataInconsistency(e.to_string()))?,
        scheduled_time: parse_ts(&scheduled)?,
        status: GameStatus::from_str(&status)
            .map_err(|e| WagerError::DataInconsistency(e.to_string()))?,
        home_spread: parse_decimal(row.try_get("home_spread")?)?,
        away_spread: parse_decimal(row.try_get("away_spread")?)?,
        total_line: parse_decimal(row.try_get("total_line")?)?,
        home_moneyline: odds("home_moneyline")?,
        away_moneyline: odds("away_moneyline")?,
        over_odds: odds("over_odds")?,
        under_odds: odds("under_odds")?,
        final_home_score: to_score(row.try_get("final_home_score")?)?,
        final_away_score: to_score(row.try_get("final_away_score")?)?,
    })
}

fn account_from_row(row: &SqliteRow) -> Result<Account, WagerError> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Account {
        id: row.try_get("id")?,
        balance: from_cents(row.try_get("balance_cents")?),
        created_at: parse_ts(&created_at)?,
    })
}

/// Conditional decrement on an open connection or transaction.
async fn debit_on(
    conn: &mut SqliteConnection,
    id: AccountId,
    amount: Decimal,
) -> Result<Decimal, WagerError> {
    let cents = to_cents(amount)?;
    if cents < 0 {
        return Err(WagerError::Validation(format!("cannot debit a negative amount {amount}")));
    }

    let updated = sqlx::query(
        "UPDATE accounts SET balance_cents = balance_cents - ?1 \
         WHERE id = ?2 AND balance_cents >= ?1 RETURNING balance_cents",
    )
    .bind(cents)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = updated {
        return Ok(from_cents(row.try_get("balance_cents")?));
    }

    let available: Option<i64> = sqlx::query_scalar("SELECT balance_cents FROM accounts WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match available {
        None => Err(WagerError::AccountNotFound(id)),
        Some(cents) => Err(WagerError::InsufficientFunds {
            needed: amount,
            available: from_cents(cents),
        }),
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl Bankroll for SqliteStore {
    async fn open_account(&self, starting_balance: Decimal) -> Result<Account, WagerError> {
        let cents = to_cents(starting_balance)?;
        if cents < 0 {
            return Err(WagerError::Validation(format!(
                "starting balance cannot be negative: {starting_balance}"
            )));
        }
        let created_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (balance_cents, created_at) VALUES (?1, ?2) RETURNING id",
        )
        .bind(cents)
        .bind(ts(created_at))
        .fetch_one(&self.pool)
        .await?;

        self.account(id).await
    }

    async fn account(&self, id: AccountId) -> Result<Account, WagerError> {
        let row = sqlx::query("SELECT id, balance_cents, created_at FROM accounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WagerError::AccountNotFound(id))?;
        account_from_row(&row)
    }

    async fn debit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        let mut conn = self.pool.acquire().await?;
        debit_on(&mut conn, id, amount).await
    }

    async fn credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        let cents = to_cents(amount)?;
        if cents < 0 {
            return Err(WagerError::Validation(format!("cannot credit a negative amount {amount}")));
        }
        // SQLite turns an overflowing integer sum into a float, so refuse it.
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE accounts SET balance_cents = balance_cents + ?1 \
             WHERE id = ?2 AND balance_cents <= 9223372036854775807 - ?1 \
             RETURNING balance_cents",
        )
        .bind(cents)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(cents) = balance {
            return Ok(from_cents(cents));
        }

        self.account(id).await?;
        Err(WagerError::Validation(format!("credit of {amount} overflows account {id}")))
    }
}

#[async_trait]
impl WagerLedger for SqliteStore {
    async fn create(&self, wager: &Wager) -> Result<Decimal, WagerError> {
        if !wager.is_pending() || wager.payout.is_some() || wager.settled_at.is_some() {
            return Err(WagerError::Validation("new wagers must be pending".to_string()));
        }
        let amount_cents = to_cents(wager.amount)?;

        // Dropping `tx` on any early return rolls the debit back.
        let mut tx = self.pool.begin().await?;

        // Lock the game row first so a result cannot be recorded between
        // the open check and the insert.
        let touched = sqlx::query("UPDATE games SET id = id WHERE id = ?1")
            .bind(wager.game_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(WagerError::GameNotFound(wager.game_id));
        }
        let open: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM games WHERE id = ?1 AND status = 'scheduled' AND scheduled_time > ?2",
        )
        .bind(wager.game_id)
        .bind(ts(wager.created_at))
        .fetch_optional(&mut *tx)
        .await?;
        if open.is_none() {
            return Err(WagerError::GameAlreadyStarted(wager.game_id));
        }

        let new_balance = debit_on(&mut tx, wager.account_id, wager.amount).await?;

        sqlx::query(&format!(
            "INSERT INTO wagers ({WAGER_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11, NULL)"
        ))
        .bind(wager.id.to_string())
        .bind(wager.account_id)
        .bind(wager.game_id)
        .bind(wager.prediction_id)
        .bind(wager.wager_type.as_str())
        .bind(wager.pick.side.as_str())
        .bind(wager.pick.line.map(|l| l.to_string()))
        .bind(amount_cents)
        .bind(i64::from(wager.odds))
        .bind(WagerStatus::Pending.as_str())
        .bind(ts(wager.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(wager_id = %wager.id, new_balance = %new_balance, "Wager recorded");
        Ok(new_balance)
    }

    async fn get(&self, id: WagerId) -> Result<Wager, WagerError> {
        let row = sqlx::query(&format!("SELECT {WAGER_COLUMNS} FROM wagers WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WagerError::WagerNotFound(id))?;
        wager_from_row(&row)
    }

    async fn find_pending_by_game(&self, game_id: GameId) -> Result<PendingWagers, WagerError> {
        let rows = sqlx::query(&format!(
            "SELECT {WAGER_COLUMNS} FROM wagers \
             WHERE game_id = ?1 AND status = 'pending' ORDER BY created_at"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        // An undecodable row stays pending and is handed back for the
        // sweep to report; it must not block the rest of the game.
        let mut pending = PendingWagers::default();
        for row in &rows {
            match wager_from_row(row) {
                Ok(wager) => pending.wagers.push(wager),
                Err(e) => {
                    let raw_id: Option<String> = row.try_get("id").ok();
                    error!(game_id, wager_id = ?raw_id, error = %e, "Pending wager is unreadable");
                    match raw_id.as_deref().map(Uuid::parse_str) {
                        Some(Ok(wager_id)) => pending.unreadable.push(FlaggedWager {
                            wager_id,
                            reason: e.to_string(),
                        }),
                        _ => warn!(game_id, "Unreadable wager has no usable id; not reported"),
                    }
                }
            }
        }
        Ok(pending)
    }

    async fn transition(
        &self,
        id: WagerId,
        settlement: Settlement,
    ) -> Result<Transition, WagerError> {
        let updated = sqlx::query(&format!(
            "UPDATE wagers SET status = ?1, payout_cents = ?2, settled_at = ?3 \
             WHERE id = ?4 AND status = 'pending' RETURNING {WAGER_COLUMNS}"
        ))
        .bind(settlement.status.as_str())
        .bind(to_cents(settlement.payout)?)
        .bind(ts(settlement.settled_at))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(Transition::Applied(wager_from_row(&row)?));
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM wagers WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(Transition::AlreadySettled),
            None => Err(WagerError::WagerNotFound(id)),
        }
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Wager>, WagerError> {
        let rows = sqlx::query(&format!(
            "SELECT {WAGER_COLUMNS} FROM wagers WHERE account_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(account_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(wager_from_row).collect()
    }

    async fn stats_view(&self, account_id: AccountId) -> Result<Vec<StatsRow>, WagerError> {
        let rows = sqlx::query(
            "SELECT status, amount_cents, payout_cents FROM wagers WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(StatsRow {
                    status: WagerStatus::from_str(&status)?,
                    amount: from_cents(row.try_get("amount_cents")?),
                    payout: row.try_get::<Option<i64>, _>("payout_cents")?.map(from_cents),
                })
            })
            .collect()
    }
}

#[async_trait]
impl GameBook for SqliteStore {
    async fn upsert_game(&self, game: &Game) -> Result<(), WagerError> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading the stored snapshot.
        sqlx::query("UPDATE games SET id = id WHERE id = ?1")
            .bind(game.id)
            .execute(&mut *tx)
            .await?;
        let stored = sqlx::query(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"))
            .bind(game.id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(game_from_row)
            .transpose()?;
        check_snapshot(stored.as_ref(), game)?;

        sqlx::query(&format!(
            "INSERT INTO games ({GAME_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
             ON CONFLICT (id) DO UPDATE SET \
                home_team = excluded.home_team, away_team = excluded.away_team, \
                sport = excluded.sport, scheduled_time = excluded.scheduled_time, \
                status = excluded.status, home_spread = excluded.home_spread, \
                away_spread = excluded.away_spread, total_line = excluded.total_line, \
                home_moneyline = excluded.home_moneyline, \
                away_moneyline = excluded.away_moneyline, over_odds = excluded.over_odds, \
                under_odds = excluded.under_odds, final_home_score = excluded.final_home_score, \
                final_away_score = excluded.final_away_score"
        ))
        .bind(game.id)
        .bind(&game.home_team)
        .bind(&game.away_team)
        .bind(game.sport.to_string())
        .bind(ts(game.scheduled_time))
        .bind(game.status.as_str())
        .bind(game.home_spread.map(|d| d.to_string()))
        .bind(game.away_spread.map(|d| d.to_string()))
        .bind(game.total_line.map(|d| d.to_string()))
        .bind(game.home_moneyline.map(i64::from))
        .bind(game.away_moneyline.map(i64::from))
        .bind(game.over_odds.map(i64::from))
        .bind(game.under_odds.map(i64::from))
        .bind(game.final_home_score.map(i64::from))
        .bind(game.final_away_score.map(i64::from))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn game(&self, id: GameId) -> Result<Option<Game>, WagerError> {
        let row = sqlx::query(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(game_from_row).transpose()
    }

    async fn upcoming_games(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Game>, WagerError> {
        let rows = sqlx::query(&format!(
            "SELECT {GAME_COLUMNS} FROM games \
             WHERE status = 'scheduled' AND scheduled_time > ?1 \
             ORDER BY scheduled_time, id LIMIT ?2"
        ))
        .bind(ts(now))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(game_from_row).collect()
    }

    async fn record_event(&self, event: &GameEvent) -> Result<Game, WagerError> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so two events for the same
        // game cannot both pass the conflict check.
        let touched = sqlx::query("UPDATE games SET id = id WHERE id = ?1")
            .bind(event.game_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(WagerError::GameNotFound(event.game_id));
        }

        let row = sqlx::query(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"))
            .bind(event.game_id)
            .fetch_one(&mut *tx)
            .await?;
        let mut game = game_from_row(&row)?;
        apply_event(&mut game, event)?;

        sqlx::query(
            "UPDATE games SET status = ?1, final_home_score = ?2, final_away_score = ?3 \
             WHERE id = ?4",
        )
        .bind(game.status.as_str())
        .bind(game.final_home_score.map(i64::from))
        .bind(game.final_away_score.map(i64::from))
        .bind(game.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(game)
    }
}
