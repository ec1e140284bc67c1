//! End-to-end settlement properties against the memory and SQLite stores.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use wagerbook::storage::{MemoryStore, SqliteStore, WagerLedger};
use wagerbook::types::*;

use crate::faulty_store::FaultyStore;
use crate::fixtures::{book_over, moneyline, nba_game, spread, total};

#[tokio::test]
async fn test_placement_debits_exactly_once() {
    let book = book_over(Arc::new(MemoryStore::new()));
    assert_ok!(book.upsert_game(&nba_game(1)).await);
    let acct = assert_ok!(book.open_account(Some(dec!(300))).await);

    let receipt = assert_ok!(
        book.place_wager(&spread(acct.id, 1, PickSide::Home, dec!(-3.5), dec!(120.25)))
            .await
    );
    assert_eq!(receipt.new_balance, dec!(179.75));
    assert_eq!(assert_ok!(book.account(acct.id).await).balance, dec!(179.75));

    // More than the remaining balance: rejected, nothing recorded.
    let err = assert_err!(
        book.place_wager(&spread(acct.id, 1, PickSide::Away, dec!(3.5), dec!(179.76)))
            .await
    );
    assert!(matches!(err, WagerError::InsufficientFunds { .. }));
    assert_eq!(assert_ok!(book.history(acct.id, 10).await).len(), 1);
    assert_eq!(assert_ok!(book.account(acct.id).await).balance, dec!(179.75));
}

#[tokio::test]
async fn test_spread_half_point_and_whole_number() {
    let book = book_over(Arc::new(MemoryStore::new()));
    let mut game = nba_game(1);
    game.home_spread = Some(dec!(-3));
    game.away_spread = Some(dec!(3));
    book.upsert_game(&nba_game(2)).await.unwrap();
    book.upsert_game(&game).await.unwrap();
    let acct = book.open_account(Some(dec!(1000))).await.unwrap();

    let push = book
        .place_wager(&spread(acct.id, 1, PickSide::Home, dec!(-3), dec!(100)))
        .await
        .unwrap();
    let half = book
        .place_wager(&spread(acct.id, 2, PickSide::Home, dec!(-3.5), dec!(110)))
        .await
        .unwrap();

    // Home wins by 3 in both games.
    let one = book.handle_game_event(&GameEvent::final_score(1, 103, 100)).await.unwrap();
    let two = book.handle_game_event(&GameEvent::final_score(2, 103, 100)).await.unwrap();
    assert_eq!(one.report.pushed, 1);
    assert_eq!(two.report.lost, 1);

    let push = book.history(acct.id, 10).await.unwrap().into_iter().find(|w| w.id == push.wager.id).unwrap();
    assert_eq!(push.status, WagerStatus::Push);
    assert_eq!(push.payout, Some(dec!(100.00)));
    let half = book.history(acct.id, 10).await.unwrap().into_iter().find(|w| w.id == half.wager.id).unwrap();
    assert_eq!(half.status, WagerStatus::Lost);
    assert_eq!(half.payout, Some(Decimal::ZERO));

    // 1000 - 100 - 110 + 100
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(890));
}

#[tokio::test]
async fn test_total_over_wins_under_loses() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(220))).await.unwrap();

    book.place_wager(&total(acct.id, 1, PickSide::Over, dec!(225.5), dec!(110))).await.unwrap();
    book.place_wager(&total(acct.id, 1, PickSide::Under, dec!(225.5), dec!(110))).await.unwrap();

    let settled = book.handle_game_event(&GameEvent::final_score(1, 114, 112)).await.unwrap();
    assert_eq!(settled.report.won, 1);
    assert_eq!(settled.report.lost, 1);
    assert_eq!(settled.report.total_paid, dec!(210.00));
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(210));
}

#[tokio::test]
async fn test_underdog_moneyline_payout() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(100))).await.unwrap();

    book.place_wager(&moneyline(acct.id, 1, PickSide::Away, 150, dec!(100))).await.unwrap();
    book.handle_game_event(&GameEvent::final_score(1, 99, 101)).await.unwrap();
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(250.00));
}

#[tokio::test]
async fn test_postponed_game_refunds_and_is_excluded_from_stats() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(125))).await.unwrap();

    book.place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(50))).await.unwrap();
    book.place_wager(&total(acct.id, 1, PickSide::Over, dec!(225.5), dec!(75))).await.unwrap();
    assert_eq!(book.account(acct.id).await.unwrap().balance, Decimal::ZERO);

    let settled = book.handle_game_event(&GameEvent::postponed(1)).await.unwrap();
    assert_eq!(settled.report.voided, 2);
    assert_eq!(settled.game.status, GameStatus::Postponed);
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(125));

    let stats = book.stats(acct.id).await.unwrap();
    assert_eq!(stats.voids, 2);
    assert_eq!(stats.total_wagered, Decimal::ZERO);
    assert_eq!(stats.total_payout, dec!(125));
    assert_eq!(stats.win_rate, Decimal::ZERO);
    assert_eq!(stats.roi, Decimal::ZERO);

    // No result can be posted for a voided game, and no new wagers are taken.
    assert!(matches!(
        book.handle_game_event(&GameEvent::final_score(1, 100, 90)).await,
        Err(WagerError::ResultConflict { .. })
    ));
    assert!(matches!(
        book.place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(10))).await,
        Err(WagerError::GameAlreadyStarted(1))
    ));
}

#[tokio::test]
async fn test_settling_twice_leaves_state_unchanged() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(500))).await.unwrap();
    book.place_wager(&spread(acct.id, 1, PickSide::Home, dec!(-3.5), dec!(110))).await.unwrap();
    book.place_wager(&moneyline(acct.id, 1, PickSide::Away, 145, dec!(40))).await.unwrap();

    let event = GameEvent::final_score(1, 120, 100);
    book.handle_game_event(&event).await.unwrap();
    let balance = book.account(acct.id).await.unwrap().balance;
    let wagers = book.history(acct.id, 10).await.unwrap();

    let again = book.handle_game_event(&event).await.unwrap();
    assert_eq!(again.report.settled(), 0);
    assert_eq!(book.account(acct.id).await.unwrap().balance, balance);
    assert_eq!(book.history(acct.id, 10).await.unwrap(), wagers);
}

#[tokio::test]
async fn test_no_settled_wagers_means_zero_rates() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(None).await.unwrap();
    book.place_wager(&moneyline(acct.id, 1, PickSide::Home, -165, dec!(10))).await.unwrap();

    let stats = book.stats(acct.id).await.unwrap();
    assert_eq!(stats.total_bets, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.win_rate, Decimal::ZERO);
    assert_eq!(stats.roi, Decimal::ZERO);
}

#[tokio::test]
async fn test_failed_credit_is_reported_and_never_repeated() {
    let store = Arc::new(FaultyStore::new());
    let book = book_over(store.clone());
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(100))).await.unwrap();
    book.place_wager(&moneyline(acct.id, 1, PickSide::Home, 100, dec!(100))).await.unwrap();

    store.fail_credits("ledger offline");
    let settled = book.handle_game_event(&GameEvent::final_score(1, 5, 1)).await.unwrap();
    assert_eq!(settled.report.won, 1);
    assert_eq!(settled.report.credit_failures.len(), 1);
    assert_eq!(book.account(acct.id).await.unwrap().balance, Decimal::ZERO);

    // The wager is terminal, so a later sweep does not pay it either.
    store.heal();
    let again = book.handle_game_event(&GameEvent::final_score(1, 5, 1)).await.unwrap();
    assert_eq!(again.report.settled(), 0);
    assert_eq!(store.credit_count(), 0);
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let book = book_over(store.clone());
    book.upsert_game(&nba_game(1)).await.unwrap();
    let acct = book.open_account(Some(dec!(500))).await.unwrap();

    let fav = book
        .place_wager(&spread(acct.id, 1, PickSide::Home, dec!(-3.5), dec!(110)))
        .await
        .unwrap();
    book.place_wager(&total(acct.id, 1, PickSide::Under, dec!(225.5), dec!(50))).await.unwrap();
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(340));

    let settled = book.handle_game_event(&GameEvent::final_score(1, 118, 110)).await.unwrap();
    assert_eq!(settled.report.won, 1);
    assert_eq!(settled.report.lost, 1);
    assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(550));

    let stored = store.get(fav.wager.id).await.unwrap();
    assert_eq!(stored.status, WagerStatus::Won);
    assert_eq!(stored.payout, Some(dec!(210)));
    assert!(stored.settled_at.is_some());

    let stats = book.stats(acct.id).await.unwrap();
    assert_eq!(stats.total_wagered, dec!(160));
    assert_eq!(stats.total_payout, dec!(210));
    assert_eq!(stats.profit, dec!(50));
    assert_eq!(stats.roi, dec!(31.25));
    assert_eq!(stats.win_rate, dec!(50));
}

#[tokio::test]
async fn test_whale_amounts_are_refused_before_money_moves() {
    let book = book_over(Arc::new(MemoryStore::new()));
    book.upsert_game(&nba_game(1)).await.unwrap();

    let huge = Decimal::from_i128_with_scale(10_i128.pow(27), 0);
    let err = assert_err!(book.open_account(Some(huge)).await);
    assert!(matches!(err, WagerError::Validation(_)));

    let acct = assert_ok!(book.open_account(Some(MAX_AMOUNT)).await);
    let err = assert_err!(
        book.place_wager(&moneyline(acct.id, 1, PickSide::Away, 1000, MAX_AMOUNT + dec!(1)))
            .await
    );
    assert!(matches!(err, WagerError::Validation(_)));
    assert_eq!(assert_ok!(book.account(acct.id).await).balance, MAX_AMOUNT);

    // The largest accepted stake settles without trouble.
    assert_ok!(
        book.place_wager(&moneyline(acct.id, 1, PickSide::Away, 1000, MAX_AMOUNT))
            .await
    );
    let settled = assert_ok!(book.handle_game_event(&GameEvent::final_score(1, 90, 95)).await);
    assert_eq!(settled.report.won, 1);
    assert!(settled.report.inconsistent.is_empty());
    assert_eq!(
        assert_ok!(book.account(acct.id).await).balance,
        dec!(11000000000.00)
    );
}

#[tokio::test]
async fn test_feed_snapshot_cannot_undo_a_settled_game() {
    for book in [
        book_over(Arc::new(MemoryStore::new())),
        book_over(Arc::new(SqliteStore::in_memory().await.unwrap())),
    ] {
        book.upsert_game(&nba_game(1)).await.unwrap();
        let acct = book.open_account(Some(dec!(100))).await.unwrap();
        book.place_wager(&moneyline(acct.id, 1, PickSide::Home, 100, dec!(100))).await.unwrap();
        book.handle_game_event(&GameEvent::final_score(1, 101, 99)).await.unwrap();

        // A stale pre-game snapshot would reopen the game for wagers.
        let err = book.upsert_game(&nba_game(1)).await.unwrap_err();
        assert!(matches!(err, WagerError::ResultConflict { .. }));
        assert_eq!(book.game(1).await.unwrap().status, GameStatus::Final);
        assert_eq!(book.account(acct.id).await.unwrap().balance, dec!(200));
    }
}
