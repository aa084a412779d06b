//! Point ledger: the Balance Mutator and the append-only history it writes.
//!
//! Every balance change produces exactly one [`PointHistory`] row carrying the
//! balance before and after. Zero deltas produce nothing. Rows for one user form
//! a contiguous chain that replays to the current balance.

use crate::errors::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = i64;

/// Categorical tag on a ledger row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointType {
    GameBet,
    GameWin,
    GameLoss,
    TaskReward,
    AdminAdjustment,
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PointType::GameBet => "GAME_BET",
            PointType::GameWin => "GAME_WIN",
            PointType::GameLoss => "GAME_LOSS",
            PointType::TaskReward => "TASK_REWARD",
            PointType::AdminAdjustment => "ADMIN_ADJUSTMENT",
        };
        f.write_str(s)
    }
}

/// Immutable ledger row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointHistory {
    pub user_id: UserId,
    /// 1-based position in the user's chain
    pub seq: u64,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: PointType,
    pub description: String,
    pub balance_before: i64,
    pub balance_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Point holder as seen by the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub points: i64,
    /// Number of ledger rows written for this user
    pub ledger_seq: u64,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(id: UserId, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username,
            points: 0,
            ledger_seq: 0,
            created_at: now,
        }
    }
}

/// A requested balance change, applied inside a store commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub user_id: UserId,
    pub amount: i64,
    pub kind: PointType,
    pub description: String,
    pub game_id: Option<Uuid>,
    /// Points the balance must hold before this delta applies. A wager settled
    /// as one net row still has to be covered in full at commit time.
    pub stake: i64,
}

impl BalanceDelta {
    pub fn new(user_id: UserId, amount: i64, kind: PointType, description: impl Into<String>) -> Self {
        Self {
            user_id,
            amount,
            kind,
            description: description.into(),
            game_id: None,
            stake: 0,
        }
    }

    pub fn for_game(mut self, game_id: Uuid) -> Self {
        self.game_id = Some(game_id);
        self
    }

    pub fn covering(mut self, stake: i64) -> Self {
        self.stake = stake;
        self
    }
}

/// Apply `delta` to `account` and return the ledger row describing it.
///
/// Returns `Ok(None)` for a zero delta. On error the account is untouched.
pub fn apply_delta(
    account: &mut UserAccount,
    delta: &BalanceDelta,
    now: DateTime<Utc>,
) -> Result<Option<PointHistory>, LedgerError> {
    if account.points < delta.stake {
        return Err(LedgerError::InsufficientBalance {
            balance: account.points,
            delta: -delta.stake,
        });
    }
    if delta.amount == 0 {
        return Ok(None);
    }

    let balance_before = account.points;
    let balance_after = balance_before
        .checked_add(delta.amount)
        .ok_or(LedgerError::Overflow {
            balance: balance_before,
            delta: delta.amount,
        })?;
    if balance_after < 0 {
        return Err(LedgerError::InsufficientBalance {
            balance: balance_before,
            delta: delta.amount,
        });
    }

    account.points = balance_after;
    account.ledger_seq += 1;

    Ok(Some(PointHistory {
        user_id: account.id,
        seq: account.ledger_seq,
        amount: delta.amount,
        kind: delta.kind,
        description: delta.description.clone(),
        balance_before,
        balance_after,
        game_id: delta.game_id,
        created_at: now,
    }))
}

/// Replay a user's history (ordered by seq) and check it ends at `current_balance`.
pub fn verify_chain(entries: &[PointHistory], current_balance: i64) -> Result<(), LedgerError> {
    let mut expected_before = 0i64;
    let mut expected_seq = 1u64;

    for entry in entries {
        if entry.seq != expected_seq {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: format!("expected seq {}", expected_seq),
            });
        }
        if entry.balance_before != expected_before {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: format!(
                    "balance_before {} does not continue from {}",
                    entry.balance_before, expected_before
                ),
            });
        }
        if entry.balance_before + entry.amount != entry.balance_after {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: "balance_before + amount != balance_after".to_string(),
            });
        }
        if entry.amount == 0 {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: "zero-amount entry".to_string(),
            });
        }
        expected_before = entry.balance_after;
        expected_seq += 1;
    }

    if expected_before != current_balance {
        return Err(LedgerError::ChainBroken {
            seq: expected_seq.saturating_sub(1),
            reason: format!(
                "history ends at {} but balance is {}",
                expected_before, current_balance
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(points: i64) -> UserAccount {
        let mut account = UserAccount::new(7, None, Utc::now());
        account.points = points;
        account
    }

    #[test]
    fn credit_writes_entry_with_snapshots() {
        let mut acc = account(0);
        let delta = BalanceDelta::new(7, 100, PointType::TaskReward, "daily task");
        let entry = apply_delta(&mut acc, &delta, Utc::now()).unwrap().unwrap();

        assert_eq!(entry.balance_before, 0);
        assert_eq!(entry.balance_after, 100);
        assert_eq!(entry.seq, 1);
        assert_eq!(acc.points, 100);
    }

    #[test]
    fn zero_delta_is_skipped() {
        let mut acc = account(50);
        let delta = BalanceDelta::new(7, 0, PointType::GameWin, "nothing");
        assert!(apply_delta(&mut acc, &delta, Utc::now()).unwrap().is_none());
        assert_eq!(acc.ledger_seq, 0);
    }

    #[test]
    fn debit_below_zero_is_rejected_without_mutation() {
        let mut acc = account(30);
        let delta = BalanceDelta::new(7, -31, PointType::GameBet, "bet");
        let err = apply_delta(&mut acc, &delta, Utc::now()).unwrap_err();

        assert_eq!(err, LedgerError::InsufficientBalance { balance: 30, delta: -31 });
        assert_eq!(acc.points, 30);
        assert_eq!(acc.ledger_seq, 0);
    }

    #[test]
    fn net_win_still_needs_the_stake_covered() {
        let mut acc = account(0);
        let delta = BalanceDelta::new(7, 100, PointType::GameWin, "spin").covering(100);
        let err = apply_delta(&mut acc, &delta, Utc::now()).unwrap_err();

        assert_eq!(err, LedgerError::InsufficientBalance { balance: 0, delta: -100 });
        assert_eq!(acc.points, 0);

        let mut acc = account(100);
        let entry = apply_delta(&mut acc, &delta, Utc::now()).unwrap().unwrap();
        assert_eq!(entry.balance_before, 100);
        assert_eq!(entry.balance_after, 200);
    }

    #[test]
    fn covered_push_writes_nothing() {
        let mut acc = account(20);
        let delta = BalanceDelta::new(7, 0, PointType::GameWin, "push").covering(20);
        assert!(apply_delta(&mut acc, &delta, Utc::now()).unwrap().is_none());
        assert!(apply_delta(&mut account(19), &delta, Utc::now()).is_err());
    }

    #[test]
    fn chain_replays_to_balance() {
        let mut acc = account(0);
        let now = Utc::now();
        let mut entries = Vec::new();
        for amount in [100, -40, 25, -85] {
            let delta = BalanceDelta::new(7, amount, PointType::AdminAdjustment, "adj");
            entries.push(apply_delta(&mut acc, &delta, now).unwrap().unwrap());
        }

        assert_eq!(acc.points, 0);
        assert!(verify_chain(&entries, acc.points).is_ok());

        entries.remove(1);
        assert!(verify_chain(&entries, acc.points).is_err());
    }
}
