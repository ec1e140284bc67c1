//! Concurrent placement and settlement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use wagerbook::engine::{BookSettings, SimulatedOutcomes, Sportsbook};
use wagerbook::storage::{GameBook, MemoryStore, SqliteStore};
use wagerbook::types::*;

use crate::faulty_store::FaultyStore;
use crate::fixtures::{book_over, moneyline, nba_game};

/// Game book whose reads return the snapshot from before a final result
/// that lands immediately after the read.
struct FinalAfterRead {
    inner: Arc<MemoryStore>,
    event: GameEvent,
}

#[async_trait]
impl GameBook for FinalAfterRead {
    async fn upsert_game(&self, game: &Game) -> Result<(), WagerError> {
        self.inner.upsert_game(game).await
    }

    async fn game(&self, id: GameId) -> Result<Option<Game>, WagerError> {
        let snapshot = self.inner.game(id).await?;
        self.inner.record_event(&self.event).await?;
        Ok(snapshot)
    }

    async fn upcoming_games(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Game>, WagerError> {
        self.inner.upcoming_games(now, limit).await
    }

    async fn record_event(&self, event: &GameEvent) -> Result<Game, WagerError> {
        self.inner.record_event(event).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_placements_never_overdraw() {
    let book = Arc::new(book_over(Arc::new(MemoryStore::new())));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(100))).await.unwrap();

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let book = book.clone();
            tokio::spawn(async move {
                book.place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(10)))
                    .await
            })
        })
        .collect();

    let mut placed = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => placed += 1,
            Err(WagerError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 10);
    assert_eq!(book.account(acct.id).await.unwrap().balance, Decimal::ZERO);
    assert_eq!(book.history(acct.id, 100).await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sweeps_credit_each_wager_once() {
    let store = Arc::new(FaultyStore::new());
    let book = Arc::new(book_over(store.clone()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(200))).await.unwrap();
    for _ in 0..20 {
        book.place_wager(&moneyline(acct.id, 1, PickSide::Away, 150, dec!(10)))
            .await
            .unwrap();
    }

    let event = GameEvent::final_score(1, 98, 104);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let book = book.clone();
            let event = event.clone();
            tokio::spawn(async move { book.handle_game_event(&event).await })
        })
        .collect();

    let mut won = 0;
    let mut skipped = 0;
    for result in join_all(handles).await {
        let settled = result.unwrap().unwrap();
        won += settled.report.won;
        skipped += settled.report.already_settled;
    }

    assert_eq!(won, 20);
    assert!(skipped <= 20 * 7);
    assert_eq!(store.credit_count(), 20);
    // 20 wins at +150 on 10 each: 25.00 back per wager.
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(500));
}

#[tokio::test]
async fn test_concurrent_placements_on_sqlite() {
    let book = Arc::new(book_over(Arc::new(SqliteStore::in_memory().await.unwrap())));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(50))).await.unwrap();

    let attempts = (0..12).map(|_| {
        let book = book.clone();
        async move {
            book.place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(5)))
                .await
        }
    });
    let placed = join_all(attempts).await.into_iter().filter(Result::is_ok).count();

    assert_eq!(placed, 10);
    assert_eq!(book.account(acct.id).await.unwrap().balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_result_landing_mid_placement_rejects_the_wager() {
    let store = Arc::new(MemoryStore::new());
    let games = Arc::new(FinalAfterRead {
        inner: store.clone(),
        event: GameEvent::final_score(1, 110, 101),
    });
    let book = Sportsbook::new(
        store.clone(),
        store.clone(),
        games,
        Arc::new(SimulatedOutcomes::new(Some(7))),
        BookSettings::default(),
    );
    store.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(100))).await.unwrap();

    let err = book
        .place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, WagerError::GameAlreadyStarted(1)));
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(100));
    assert!(book.history(acct.id, 10).await.unwrap().is_empty());
}
