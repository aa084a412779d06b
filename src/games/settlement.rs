//! Settlement decisions for stale session games.
//!
//! A game left active past the stale threshold is either refunded (the player
//! never acted) or forced to a loss (they did). The decision is pure; `plan`
//! turns it into a [`ChangeSet`] the store commits atomically.

use super::blackjack::BlackjackPhase;
use super::types::{GameKind, GameRecord, GameResultKind, GameState, GameStatus};
use crate::ledger::{BalanceDelta, PointType};
use crate::store::ChangeSet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const BLACKJACK_REFUND_DESCRIPTION: &str = "Blackjack Zaman Aşımı İadesi";
pub const MINES_REFUND_DESCRIPTION: &str = "Mines Zaman Aşımı İadesi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SettlementDecision {
    Refund { amount: i64 },
    ForceLoss,
    LeaveActive { reason: String },
}

impl SettlementDecision {
    pub fn label(&self) -> &'static str {
        match self {
            SettlementDecision::Refund { .. } => "refund",
            SettlementDecision::ForceLoss => "force_loss",
            SettlementDecision::LeaveActive { .. } => "leave_active",
        }
    }
}

/// Games created before this instant are stale
pub fn stale_threshold(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    now - stale_after
}

pub fn decide(game: &GameRecord, now: DateTime<Utc>, stale_after: Duration) -> SettlementDecision {
    if !game.is_active() {
        return SettlementDecision::LeaveActive {
            reason: format!("status is {:?}", game.status),
        };
    }
    if game.created_at >= stale_threshold(now, stale_after) {
        return SettlementDecision::LeaveActive {
            reason: "not stale yet".to_string(),
        };
    }

    let played = game.played();
    let should_refund = match &game.state {
        GameState::Blackjack(bj) => !played && bj.phase == BlackjackPhase::Playing,
        GameState::Mines(mines) => !played && mines.revealed_count() == 0,
        GameState::Roulette(_) => false,
    };

    if should_refund {
        SettlementDecision::Refund {
            amount: refund_amount(game),
        }
    } else {
        SettlementDecision::ForceLoss
    }
}

fn refund_amount(game: &GameRecord) -> i64 {
    match game.kind {
        GameKind::Blackjack => game.bet_amount + game.split_bet_amount,
        _ => game.bet_amount,
    }
}

/// Build the atomic write for a decision. `None` when nothing should change.
pub fn plan(game: &GameRecord, decision: &SettlementDecision, now: DateTime<Utc>) -> Option<ChangeSet> {
    let mut record = game.clone();
    let mut changes = ChangeSet::new();

    match decision {
        SettlementDecision::LeaveActive { .. } => return None,
        SettlementDecision::Refund { amount } => {
            let (status, description) = match game.kind {
                GameKind::Blackjack => (GameStatus::Cancelled, BLACKJACK_REFUND_DESCRIPTION),
                _ => (GameStatus::Timeout, MINES_REFUND_DESCRIPTION),
            };
            record.finish(status, GameResultKind::Timeout, *amount, now);
            if *amount > 0 {
                changes.push_delta(
                    BalanceDelta::new(game.user_id, *amount, PointType::GameWin, description).for_game(game.id),
                );
            }
        }
        SettlementDecision::ForceLoss => {
            record.finish(GameStatus::Completed, GameResultKind::Lose, 0, now);
        }
    }

    changes.push_transition(record);
    Some(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::blackjack::{BlackjackState, Card, Suit};
    use crate::games::mines::MinesState;
    use crate::store::GameWrite;

    fn blackjack_game(created_at: DateTime<Utc>) -> GameRecord {
        let state = BlackjackState::dealt(
            vec![Card::new(10, Suit::Hearts), Card::new(6, Suit::Clubs)],
            vec![
                Card::new(9, Suit::Spades),
                Card {
                    hidden: Some(true),
                    ..Card::new(7, Suit::Diamonds)
                },
            ],
            Vec::new(),
        );
        GameRecord::new_active(1, 100, GameState::Blackjack(state), created_at)
    }

    fn mines_game(created_at: DateTime<Utc>) -> GameRecord {
        GameRecord::new_active(1, 50, GameState::Mines(MinesState::new(3, vec![0, 1, 2])), created_at)
    }

    #[test]
    fn fresh_games_are_left_alone() {
        let now = Utc::now();
        let game = blackjack_game(now - Duration::minutes(29));
        assert!(matches!(
            decide(&game, now, Duration::minutes(30)),
            SettlementDecision::LeaveActive { .. }
        ));
    }

    #[test]
    fn untouched_blackjack_refunds_both_stakes() {
        let now = Utc::now();
        let mut game = blackjack_game(now - Duration::minutes(31));
        game.split_bet_amount = 40;
        assert_eq!(
            decide(&game, now, Duration::minutes(30)),
            SettlementDecision::Refund { amount: 140 }
        );
    }

    #[test]
    fn blackjack_outside_playing_phase_is_forced_to_loss() {
        let now = Utc::now();
        let mut game = blackjack_game(now - Duration::minutes(31));
        if let GameState::Blackjack(bj) = &mut game.state {
            bj.phase = BlackjackPhase::DealerTurn;
        }
        assert_eq!(decide(&game, now, Duration::minutes(30)), SettlementDecision::ForceLoss);
    }

    #[test]
    fn played_mines_is_forced_to_loss() {
        let now = Utc::now();
        let mut game = mines_game(now - Duration::hours(2));
        if let GameState::Mines(mines) = &mut game.state {
            mines.revealed.push(9);
        }
        assert_eq!(decide(&game, now, Duration::minutes(30)), SettlementDecision::ForceLoss);
    }

    #[test]
    fn legacy_snapshot_overrides_typed_state() {
        let now = Utc::now();
        let mut game = blackjack_game(now - Duration::minutes(45));
        game.legacy_state_json = Some(r#"{"playerHand":[{},{},{}]}"#.to_string());
        assert_eq!(decide(&game, now, Duration::minutes(30)), SettlementDecision::ForceLoss);

        game.legacy_state_json = Some("garbage".to_string());
        assert_eq!(
            decide(&game, now, Duration::minutes(30)),
            SettlementDecision::Refund { amount: 100 }
        );
    }

    #[test]
    fn refund_plan_credits_and_cancels() {
        let now = Utc::now();
        let game = blackjack_game(now - Duration::minutes(31));
        let plan = plan(&game, &SettlementDecision::Refund { amount: 100 }, now).unwrap();

        assert_eq!(plan.deltas.len(), 1);
        assert_eq!(plan.deltas[0].amount, 100);
        assert_eq!(plan.deltas[0].kind, PointType::GameWin);
        assert_eq!(plan.deltas[0].description, BLACKJACK_REFUND_DESCRIPTION);

        let GameWrite::Transition(record) = &plan.games[0] else {
            panic!("expected a transition");
        };
        assert_eq!(record.status, GameStatus::Cancelled);
        assert_eq!(record.result, Some(GameResultKind::Timeout));
        assert_eq!(record.payout, 100);
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn mines_refund_uses_timeout_status() {
        let now = Utc::now();
        let game = mines_game(now - Duration::minutes(31));
        let plan = plan(&game, &SettlementDecision::Refund { amount: 50 }, now).unwrap();
        let GameWrite::Transition(record) = &plan.games[0] else {
            panic!("expected a transition");
        };
        assert_eq!(record.status, GameStatus::Timeout);
        assert_eq!(plan.deltas[0].description, MINES_REFUND_DESCRIPTION);
    }

    #[test]
    fn zero_stake_refund_writes_no_delta() {
        let now = Utc::now();
        let mut game = mines_game(now - Duration::minutes(31));
        game.bet_amount = 0;
        let plan = plan(&game, &SettlementDecision::Refund { amount: 0 }, now).unwrap();
        assert!(plan.deltas.is_empty());
        assert_eq!(plan.games.len(), 1);
    }

    #[test]
    fn force_loss_plan() {
        let now = Utc::now();
        let game = mines_game(now - Duration::minutes(31));
        let plan = plan(&game, &SettlementDecision::ForceLoss, now).unwrap();
        assert!(plan.deltas.is_empty());
        let GameWrite::Transition(record) = &plan.games[0] else {
            panic!("expected a transition");
        };
        assert_eq!(record.status, GameStatus::Completed);
        assert_eq!(record.result, Some(GameResultKind::Lose));
        assert_eq!(record.payout, 0);
    }
}
