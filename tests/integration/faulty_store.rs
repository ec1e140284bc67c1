//! Fault-injecting store for integration testing.
//!
//! Wraps a `MemoryStore` and delegates everything to it, except that
//! credits can be forced to fail and are counted so tests can check a
//! wager is never paid twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use wagerbook::storage::{Bankroll, GameBook, MemoryStore, WagerLedger};
use wagerbook::types::*;

#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    /// If set, every credit fails with this message.
    force_credit_error: Mutex<Option<String>>,
    credits: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_credits(&self, message: &str) {
        *self.force_credit_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn heal(&self) {
        *self.force_credit_error.lock().unwrap() = None;
    }

    pub fn credit_count(&self) -> usize {
        self.credits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bankroll for FaultyStore {
    async fn open_account(&self, starting_balance: Decimal) -> Result<Account, WagerError> {
        self.inner.open_account(starting_balance).await
    }

    async fn account(&self, id: AccountId) -> Result<Account, WagerError> {
        self.inner.account(id).await
    }

    async fn debit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        self.inner.debit(id, amount).await
    }

    async fn credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        let forced = self.force_credit_error.lock().unwrap().clone();
        if let Some(message) = forced {
            return Err(WagerError::Storage(message));
        }
        self.credits.fetch_add(1, Ordering::SeqCst);
        self.inner.credit(id, amount).await
    }
}

#[async_trait]
impl WagerLedger for FaultyStore {
    async fn create(&self, wager: &Wager) -> Result<Decimal, WagerError> {
        self.inner.create(wager).await
    }

    async fn get(&self, id: WagerId) -> Result<Wager, WagerError> {
        self.inner.get(id).await
    }

    async fn find_pending_by_game(&self, game_id: GameId) -> Result<PendingWagers, WagerError> {
        self.inner.find_pending_by_game(game_id).await
    }

    async fn transition(&self, id: WagerId, settlement: Settlement) -> Result<Transition, WagerError> {
        self.inner.transition(id, settlement).await
    }

    async fn list_by_account(&self, account_id: AccountId, limit: usize) -> Result<Vec<Wager>, WagerError> {
        self.inner.list_by_account(account_id, limit).await
    }

    async fn stats_view(&self, account_id: AccountId) -> Result<Vec<StatsRow>, WagerError> {
        self.inner.stats_view(account_id).await
    }
}

#[async_trait]
impl GameBook for FaultyStore {
    async fn upsert_game(&self, game: &Game) -> Result<(), WagerError> {
        self.inner.upsert_game(game).await
    }

    async fn game(&self, id: GameId) -> Result<Option<Game>, WagerError> {
        self.inner.game(id).await
    }

    async fn upcoming_games(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Game>, WagerError> {
        self.inner.upcoming_games(now, limit).await
    }

    async fn record_event(&self, event: &GameEvent) -> Result<Game, WagerError> {
        self.inner.record_event(event).await
    }
}
