//! In-memory store.
//!
//! Every operation runs under a single mutex, which makes each trait call
//! atomic: placement's game check, debit and insert, and settlement's
//! compare-and-swap cannot interleave with anything else. Used by tests and the demo
//! binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{apply_event, check_snapshot, Bankroll, GameBook, WagerLedger};
use crate::types::{
    Account, AccountId, Game, GameEvent, GameId, GameStatus, PendingWagers, Settlement, StatsRow,
    Transition, Wager, WagerError, WagerId,
};

#[derive(Default)]
struct Inner {
    next_account_id: AccountId,
    accounts: HashMap<AccountId, Account>,
    games: HashMap<GameId, Game>,
    wagers: HashMap<WagerId, Wager>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, WagerError> {
        self.inner
            .lock()
            .map_err(|_| WagerError::Storage("memory store lock poisoned".to_string()))
    }
}

fn debit_locked(inner: &mut Inner, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
    if amount < Decimal::ZERO {
        return Err(WagerError::Validation(format!("cannot debit a negative amount {amount}")));
    }
    let account = inner
        .accounts
        .get_mut(&id)
        .ok_or(WagerError::AccountNotFound(id))?;
    if amount > account.balance {
        return Err(WagerError::InsufficientFunds {
            needed: amount,
            available: account.balance,
        });
    }
    account.balance -= amount;
    Ok(account.balance)
}

#[async_trait]
impl Bankroll for MemoryStore {
    async fn open_account(&self, starting_balance: Decimal) -> Result<Account, WagerError> {
        if starting_balance < Decimal::ZERO {
            return Err(WagerError::Validation(format!(
                "starting balance cannot be negative: {starting_balance}"
            )));
        }
        let mut inner = self.lock()?;
        inner.next_account_id += 1;
        let account = Account {
            id: inner.next_account_id,
            balance: starting_balance,
            created_at: Utc::now(),
        };
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account(&self, id: AccountId) -> Result<Account, WagerError> {
        self.lock()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(WagerError::AccountNotFound(id))
    }

    async fn debit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        let mut inner = self.lock()?;
        debit_locked(&mut inner, id, amount)
    }

    async fn credit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, WagerError> {
        if amount < Decimal::ZERO {
            return Err(WagerError::Validation(format!("cannot credit a negative amount {amount}")));
        }
        let mut inner = self.lock()?;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(WagerError::AccountNotFound(id))?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| WagerError::Validation(format!("credit of {amount} overflows account {id}")))?;
        Ok(account.balance)
    }
}

#[async_trait]
impl WagerLedger for MemoryStore {
    async fn create(&self, wager: &Wager) -> Result<Decimal, WagerError> {
        if !wager.is_pending() || wager.payout.is_some() || wager.settled_at.is_some() {
            return Err(WagerError::Validation("new wagers must be pending".to_string()));
        }
        let mut inner = self.lock()?;
        if inner.wagers.contains_key(&wager.id) {
            return Err(WagerError::Storage(format!("duplicate wager id {}", wager.id)));
        }
        let game = inner
            .games
            .get(&wager.game_id)
            .ok_or(WagerError::GameNotFound(wager.game_id))?;
        if !game.is_open_for_wagers(wager.created_at) {
            return Err(WagerError::GameAlreadyStarted(game.id));
        }
        // The id is free, so the insert cannot fail after the debit succeeds.
        let new_balance = debit_locked(&mut inner, wager.account_id, wager.amount)?;
        inner.wagers.insert(wager.id, wager.clone());
        debug!(wager_id = %wager.id, new_balance = %new_balance, "Wager recorded");
        Ok(new_balance)
    }

    async fn get(&self, id: WagerId) -> Result<Wager, WagerError> {
        self.lock()?
            .wagers
            .get(&id)
            .cloned()
            .ok_or(WagerError::WagerNotFound(id))
    }

    async fn find_pending_by_game(&self, game_id: GameId) -> Result<PendingWagers, WagerError> {
        let inner = self.lock()?;
        let mut wagers: Vec<Wager> = inner
            .wagers
            .values()
            .filter(|w| w.game_id == game_id && w.is_pending())
            .cloned()
            .collect();
        wagers.sort_by_key(|w| w.created_at);
        Ok(PendingWagers { wagers, unreadable: Vec::new() })
    }

    async fn transition(
        &self,
        id: WagerId,
        settlement: Settlement,
    ) -> Result<Transition, WagerError> {
        let mut inner = self.lock()?;
        let wager = inner.wagers.get_mut(&id).ok_or(WagerError::WagerNotFound(id))?;
        if !wager.is_pending() {
            return Ok(Transition::AlreadySettled);
        }
        wager.apply(&settlement);
        Ok(Transition::Applied(wager.clone()))
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Wager>, WagerError> {
        let inner = self.lock()?;
        let mut wagers: Vec<Wager> = inner
            .wagers
            .values()
            .filter(|w| w.account_id == account_id)
            .cloned()
            .collect();
        wagers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        wagers.truncate(limit);
        Ok(wagers)
    }

    async fn stats_view(&self, account_id: AccountId) -> Result<Vec<StatsRow>, WagerError> {
        let inner = self.lock()?;
        Ok(inner
            .wagers
            .values()
            .filter(|w| w.account_id == account_id)
            .map(StatsRow::from)
            .collect())
    }
}

#[async_trait]
impl GameBook for MemoryStore {
    async fn upsert_game(&self, game: &Game) -> Result<(), WagerError> {
        let mut inner = self.lock()?;
        check_snapshot(inner.games.get(&game.id), game)?;
        inner.games.insert(game.id, game.clone());
        Ok(())
    }

    async fn game(&self, id: GameId) -> Result<Option<Game>, WagerError> {
        Ok(self.lock()?.games.get(&id).cloned())
    }

    async fn upcoming_games(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Game>, WagerError> {
        let inner = self.lock()?;
        let mut games: Vec<Game> = inner
            .games
            .values()
            .filter(|g| g.status == GameStatus::Scheduled && g.scheduled_time > now)
            .cloned()
            .collect();
        games.sort_by_key(|g| (g.scheduled_time, g.id));
        games.truncate(limit);
        Ok(games)
    }

    async fn record_event(&self, event: &GameEvent) -> Result<Game, WagerError> {
        let mut inner = self.lock()?;
        let game = inner
            .games
            .get_mut(&event.game_id)
            .ok_or(WagerError::GameNotFound(event.game_id))?;
        apply_event(game, event)?;
        Ok(game.clone())
    }
}
