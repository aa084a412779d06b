//! Roulette payouts and wager validation through `GameService`.

mod common;

use common::YieldingStore;
use pointvault::clock::SystemClock;
use pointvault::errors::{RewardsError, WagerError};
use pointvault::games::roulette::{self, BetKind, Color, RouletteBet, SpinOutcome};
use pointvault::games::{GameKind, GameService, GameSettings};
use pointvault::ledger::{verify_chain, PointType};
use pointvault::store::{full_history, MemoryStore, PointsStore};
use std::sync::Arc;

fn bet(kind: BetKind, value: Option<u8>, amount: i64) -> RouletteBet {
    RouletteBet::new(kind, value, amount)
}

async fn funded_service(user_id: i64, points: i64) -> (GameService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = GameService::new(store.clone(), Arc::new(SystemClock)).with_seed(7);
    store.create_user(user_id, Some("deniz".to_string())).await.unwrap();
    if points > 0 {
        service
            .grant_points(user_id, points, PointType::TaskReward, "Görev Ödülü")
            .await
            .unwrap();
    }
    (service, store)
}

fn rejection_code(err: RewardsError) -> &'static str {
    match err {
        RewardsError::Wager(e) => e.code(),
        other => panic!("expected a wager rejection, got {other}"),
    }
}

#[test]
fn red_bet_on_fourteen_doubles_the_stake() {
    let outcome = SpinOutcome::from_number(14);
    assert_eq!(outcome.color, Color::Red);

    let settlement = roulette::settle(&[bet(BetKind::Red, None, 20)], outcome);
    assert_eq!(settlement.total_stake, 20);
    assert_eq!(settlement.total_win, 40);
    assert_eq!(settlement.net_change, 20);
}

#[test]
fn straight_up_pays_thirty_six_times() {
    let bets = [bet(BetKind::Number, Some(17), 10), bet(BetKind::Black, None, 10)];
    let settlement = roulette::settle(&bets, SpinOutcome::from_number(17));
    assert_eq!(settlement.per_bet[0].payout, 360);
    // 17 is black
    assert_eq!(settlement.per_bet[1].payout, 20);
    assert_eq!(settlement.net_change, 360);
}

#[test]
fn zero_sweeps_outside_bets() {
    let bets = [
        bet(BetKind::Red, None, 10),
        bet(BetKind::Even, None, 10),
        bet(BetKind::Dozen, Some(1), 10),
        bet(BetKind::Number, Some(0), 10),
    ];
    let settlement = roulette::settle(&bets, SpinOutcome::from_number(0));
    assert_eq!(settlement.total_win, 360);
    assert_eq!(settlement.per_bet.iter().filter(|b| b.won).count(), 1);
}

#[tokio::test]
async fn spins_keep_the_ledger_consistent() {
    let (service, store) = funded_service(1, 300).await;
    // Exactly one of these wins on every spin
    let slip = vec![
        bet(BetKind::Red, None, 10),
        bet(BetKind::Black, None, 10),
        bet(BetKind::Number, Some(0), 10),
    ];

    let mut balance = 300;
    for _ in 0..25 {
        let receipt = service.spin_roulette(1, slip.clone()).await.unwrap();
        let expected = if receipt.outcome.number == 0 { 330 } else { -10 };
        assert_eq!(receipt.settlement.net_change, expected);
        assert_eq!(receipt.new_balance, balance + expected);
        balance = receipt.new_balance;
        assert!(balance >= 0);

        let game = store.game(receipt.game_id).await.unwrap().unwrap();
        assert!(!game.is_active());
        assert_eq!(game.payout, receipt.settlement.total_win);
    }

    let history = full_history(store.as_ref(), 1).await.unwrap();
    verify_chain(&history, balance).unwrap();
    // One consolidated row per spin, after the opening grant
    assert_eq!(history.len(), 26);
    assert!(history[1..]
        .iter()
        .all(|e| matches!(e.kind, PointType::GameWin | PointType::GameLoss)));
}

#[tokio::test]
async fn balance_never_goes_negative() {
    let (service, store) = funded_service(2, 25).await;
    let slip = vec![bet(BetKind::Odd, None, 10), bet(BetKind::Even, None, 10)];

    // Odd/even pushes unless the ball lands on zero, which takes the whole slip
    let mut rejected = false;
    for _ in 0..5_000 {
        let balance = store.user(2).await.unwrap().unwrap().points;
        match service.spin_roulette(2, slip.clone()).await {
            Ok(receipt) => assert!(receipt.new_balance >= 0),
            Err(err) => {
                assert!(balance < 20);
                assert_eq!(rejection_code(err), "INSUFFICIENT_BALANCE");
                rejected = true;
                break;
            }
        }
    }
    assert!(rejected);
    assert!(store.user(2).await.unwrap().unwrap().points >= 0);
}

#[tokio::test]
async fn rejections_carry_stable_codes_and_write_nothing() {
    let (service, store) = funded_service(3, 1_000).await;
    let red = |amount| vec![bet(BetKind::Red, None, amount)];

    let err = service.spin_roulette(3, Vec::new()).await.unwrap_err();
    assert_eq!(rejection_code(err), "NO_BETS");

    let err = service.spin_roulette(3, red(5)).await.unwrap_err();
    assert_eq!(rejection_code(err), "MIN_BET_NOT_MET");

    let too_many = vec![bet(BetKind::Red, None, 10); roulette::MAX_BETS + 1];
    let err = service.spin_roulette(3, too_many).await.unwrap_err();
    assert_eq!(rejection_code(err), "TOO_MANY_BETS");

    let err = service
        .spin_roulette(3, vec![bet(BetKind::Dozen, Some(4), 10)])
        .await
        .unwrap_err();
    assert_eq!(rejection_code(err), "INVALID_BET");

    store
        .put_game_settings(GameKind::Roulette, GameSettings { enabled: true, min_bet: 10, max_bet: 50 })
        .await
        .unwrap();
    let err = service
        .spin_roulette(3, vec![bet(BetKind::Red, None, 30), bet(BetKind::Odd, None, 30)])
        .await
        .unwrap_err();
    assert_eq!(rejection_code(err), "MAX_BET_EXCEEDED");

    store
        .put_game_settings(GameKind::Roulette, GameSettings { enabled: false, ..Default::default() })
        .await
        .unwrap();
    let err = service.spin_roulette(3, red(10)).await.unwrap_err();
    assert!(matches!(err, RewardsError::Wager(WagerError::GameDisabled)));

    let history = full_history(store.as_ref(), 3).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(store.user(3).await.unwrap().unwrap().points, 1_000);
}

#[tokio::test]
async fn unknown_player_cannot_spin() {
    let (service, _store) = funded_service(4, 0).await;
    let err = service.spin_roulette(99, vec![bet(BetKind::Red, None, 10)]).await.unwrap_err();
    assert!(matches!(err, RewardsError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_spins_cannot_stake_the_same_points_twice() {
    let mut rejections = 0;
    for seed in 0..8 {
        let store = Arc::new(YieldingStore::new());
        let service = GameService::new(store.clone(), Arc::new(SystemClock)).with_seed(seed);
        store.create_user(1, None).await.unwrap();
        service
            .grant_points(1, 100, PointType::TaskReward, "Görev Ödülü")
            .await
            .unwrap();

        let red = || vec![bet(BetKind::Red, None, 100)];
        let (a, b) = tokio::join!(service.spin_roulette(1, red()), service.spin_roulette(1, red()));

        let mut accepted = 0;
        for result in [a, b] {
            match result {
                Ok(_) => accepted += 1,
                Err(err) => {
                    assert_eq!(rejection_code(err), "INSUFFICIENT_BALANCE");
                    rejections += 1;
                }
            }
        }

        let balance = store.user(1).await.unwrap().unwrap().points;
        let history = full_history(store.as_ref(), 1).await.unwrap();
        verify_chain(&history, balance).unwrap();
        assert_eq!(history.len(), 1 + accepted, "seed {seed}");
        // Each accepted spin settled against a balance covering its stake
        assert!(
            history[1..].iter().all(|e| e.balance_before >= 100),
            "seed {seed}: {history:?}"
        );
    }
    // Whenever the first spin loses, the second has nothing left to stake
    assert!(rejections > 0);
}
