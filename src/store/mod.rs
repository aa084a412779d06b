//! Persistence seam for users, games, ledger rows and game settings.
//!
//! Every balance change and game write goes through [`PointsStore::commit`],
//! which stages a whole [`ChangeSet`] against the current rows and persists
//! it in one atomic write, or not at all.

pub mod memory;
pub mod rocks;

pub use crate::ledger::UserAccount;
pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::config::GamesConfig;
use crate::errors::{LedgerError, RewardsError, RewardsResult, StorageError, WagerError};
use crate::games::types::{GameId, GameKind, GameRecord, GameSettings};
use crate::ledger::{apply_delta, BalanceDelta, PointHistory, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A game row to write as part of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameWrite {
    /// New game; the id must be unused
    Insert(GameRecord),
    /// Replace an existing game. Only succeeds while the stored row is still
    /// active and at the revision the caller read.
    Transition(GameRecord),
}

impl GameWrite {
    pub fn record(&self) -> &GameRecord {
        match self {
            GameWrite::Insert(record) | GameWrite::Transition(record) => record,
        }
    }
}

/// Game writes and balance deltas applied together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub games: Vec<GameWrite>,
    pub deltas: Vec<BalanceDelta>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_insert(&mut self, record: GameRecord) {
        self.games.push(GameWrite::Insert(record));
    }

    pub fn push_transition(&mut self, record: GameRecord) {
        self.games.push(GameWrite::Transition(record));
    }

    /// Zero deltas are dropped here so they never reach the ledger
    /// Zero deltas are dropped unless they carry a stake to check
    pub fn push_delta(&mut self, delta: BalanceDelta) {
        if delta.amount != 0 || delta.stake > 0 {
            self.deltas.push(delta);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.deltas.is_empty()
    }
}

/// What a successful commit wrote
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    pub entries: Vec<PointHistory>,
    pub games: Vec<GameRecord>,
    pub balances: HashMap<UserId, i64>,
}

impl CommitReceipt {
    pub fn balance_of(&self, user_id: UserId) -> Option<i64> {
        self.balances.get(&user_id).copied()
    }
}

/// One page of a user's ledger, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<PointHistory>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PointsStore: Send + Sync {
    /// Create the user if missing and return the stored row
    async fn create_user(&self, id: UserId, username: Option<String>) -> RewardsResult<UserAccount>;

    async fn user(&self, id: UserId) -> RewardsResult<Option<UserAccount>>;

    async fn game(&self, id: GameId) -> RewardsResult<Option<GameRecord>>;

    /// Active games of `kind` created before `created_before`, oldest first
    async fn stale_games(
        &self,
        kind: GameKind,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> RewardsResult<Vec<GameRecord>>;

    async fn active_game_for(&self, user_id: UserId, kind: GameKind) -> RewardsResult<Option<GameRecord>>;

    async fn history(&self, user_id: UserId, cursor: Option<&str>, limit: usize) -> RewardsResult<HistoryPage>;

    async fn stored_game_settings(&self, kind: GameKind) -> RewardsResult<Option<GameSettings>>;

    /// Stored settings, or the defaults when none were written
    async fn game_settings(&self, kind: GameKind) -> RewardsResult<GameSettings> {
        Ok(self.stored_game_settings(kind).await?.unwrap_or_default())
    }

    async fn put_game_settings(&self, kind: GameKind, settings: GameSettings) -> RewardsResult<()>;

    async fn commit(&self, changes: ChangeSet) -> RewardsResult<CommitReceipt>;
}

/// Rows produced by staging a change set, ready to persist
#[derive(Debug, Default)]
pub(crate) struct StagedCommit {
    pub users: HashMap<UserId, UserAccount>,
    /// (row as stored before this commit, row to write)
    pub games: Vec<(Option<GameRecord>, GameRecord)>,
    pub entries: Vec<PointHistory>,
}

impl StagedCommit {
    pub fn into_receipt(self) -> CommitReceipt {
        CommitReceipt {
            balances: self.users.iter().map(|(id, user)| (*id, user.points)).collect(),
            games: self.games.into_iter().map(|(_, record)| record).collect(),
            entries: self.entries,
        }
    }
}

/// Validate and apply a change set against the current rows without writing.
///
/// Shared by every store so conditional transitions and ledger rules behave
/// the same regardless of backend. Stores call it under their commit lock, so
/// the owner's active game lookup and the balances it sees are current.
/// Nothing is persisted on error.
pub(crate) fn stage_changes<U, G, A>(
    changes: ChangeSet,
    mut load_user: U,
    mut load_game: G,
    mut active_for: A,
    now: DateTime<Utc>,
) -> RewardsResult<StagedCommit>
where
    U: FnMut(UserId) -> RewardsResult<Option<UserAccount>>,
    G: FnMut(GameId) -> RewardsResult<Option<GameRecord>>,
    A: FnMut(UserId, GameKind) -> RewardsResult<Option<GameId>>,
{
    let mut staged = StagedCommit::default();

    for write in changes.games {
        match write {
            GameWrite::Insert(mut record) => {
                check_record(&record)?;
                if load_game(record.id)?.is_some() {
                    return Err(StorageError::WriteFailed(format!("game {} already exists", record.id)).into());
                }
                if record.is_active() && active_for(record.user_id, record.kind)?.is_some() {
                    return Err(WagerError::GameInProgress(record.kind.to_string()).into());
                }
                record.revision = 1;
                staged.games.push((None, record));
            }
            GameWrite::Transition(mut record) => {
                check_record(&record)?;
                let stored = load_game(record.id)?
                    .ok_or_else(|| RewardsError::NotFound(format!("game {}", record.id)))?;
                if !stored.is_active() || stored.revision != record.revision {
                    return Err(RewardsError::Conflict { game_id: record.id });
                }
                record.revision = stored.revision + 1;
                staged.games.push((Some(stored), record));
            }
        }
    }

    for delta in &changes.deltas {
        let user = match staged.users.entry(delta.user_id) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let loaded = load_user(delta.user_id)?.ok_or(LedgerError::UserNotFound(delta.user_id))?;
                slot.insert(loaded)
            }
        };
        if let Some(entry) = apply_delta(user, delta, now)? {
            staged.entries.push(entry);
        }
    }

    Ok(staged)
}

fn check_record(record: &GameRecord) -> RewardsResult<()> {
    record
        .check_invariants()
        .map_err(|reason| StorageError::WriteFailed(reason).into())
}

pub fn encode_cursor(seq: u64) -> String {
    hex::encode(seq.to_be_bytes())
}

pub fn decode_cursor(cursor: &str) -> RewardsResult<u64> {
    let bytes = hex::decode(cursor)
        .map_err(|e| StorageError::CorruptedData(format!("Invalid cursor hex: {}", e)))?;
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::CorruptedData("Cursor must be 8 bytes".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Whole ledger for one user in chain order
pub async fn full_history(store: &dyn PointsStore, user_id: UserId) -> RewardsResult<Vec<PointHistory>> {
    let mut entries = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.history(user_id, cursor.as_deref(), 500).await?;
        entries.extend(page.entries);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    entries.reverse();
    Ok(entries)
}

/// Write the configured limits for every game kind that has none stored yet.
///
/// Limits changed at runtime survive restarts. Returns the kinds written.
pub async fn seed_game_settings(store: &dyn PointsStore, games: &GamesConfig) -> RewardsResult<Vec<GameKind>> {
    let mut seeded = Vec::new();
    for kind in GameKind::ALL {
        if store.stored_game_settings(kind).await?.is_none() {
            store.put_game_settings(kind, games.for_kind(kind).clone()).await?;
            seeded.push(kind);
        }
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::mines::MinesState;
    use crate::games::types::{GameResultKind, GameState, GameStatus};
    use crate::ledger::PointType;

    fn user(points: i64) -> UserAccount {
        let mut user = UserAccount::new(1, None, Utc::now());
        user.points = points;
        user
    }

    fn game() -> GameRecord {
        GameRecord::new_active(1, 10, GameState::Mines(MinesState::new(1, vec![0])), Utc::now())
    }

    fn no_active(_: UserId, _: GameKind) -> RewardsResult<Option<GameId>> {
        Ok(None)
    }

    #[test]
    fn cursor_round_trip() {
        assert_eq!(decode_cursor(&encode_cursor(42)).unwrap(), 42);
        assert!(decode_cursor("zz").is_err());
        assert!(decode_cursor("0102").is_err());
    }

    #[test]
    fn zero_deltas_are_dropped() {
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(1, 0, PointType::GameWin, "nothing"));
        assert!(changes.is_empty());
    }

    #[test]
    fn transition_requires_matching_revision() {
        let mut stored = game();
        stored.revision = 3;

        let mut stale = stored.clone();
        stale.revision = 2;
        stale.finish(GameStatus::Completed, GameResultKind::Lose, 0, Utc::now());

        let mut changes = ChangeSet::new();
        changes.push_transition(stale);
        let err = stage_changes(changes, |_| Ok(Some(user(0))), |_| Ok(Some(stored.clone())), no_active, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RewardsError::Conflict { .. }));
    }

    #[test]
    fn terminal_rows_are_immutable() {
        let mut stored = game();
        stored.finish(GameStatus::Completed, GameResultKind::Lose, 0, Utc::now());

        let mut changes = ChangeSet::new();
        changes.push_transition(stored.clone());
        let err = stage_changes(changes, |_| Ok(None), |_| Ok(Some(stored.clone())), no_active, Utc::now()).unwrap_err();
        assert!(matches!(err, RewardsError::Conflict { .. }));
    }

    #[test]
    fn deltas_to_the_same_user_chain() {
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(1, -30, PointType::GameBet, "bet"));
        changes.push_delta(BalanceDelta::new(1, 75, PointType::GameWin, "win"));

        let staged = stage_changes(changes, |_| Ok(Some(user(50))), |_| Ok(None), no_active, Utc::now()).unwrap();
        assert_eq!(staged.entries.len(), 2);
        assert_eq!(staged.entries[1].balance_before, 20);
        assert_eq!(staged.users[&1].points, 95);
    }

    #[test]
    fn overdraft_rejects_whole_change_set() {
        let mut changes = ChangeSet::new();
        changes.push_insert(game());
        changes.push_delta(BalanceDelta::new(1, -100, PointType::GameBet, "bet"));

        let err = stage_changes(changes, |_| Ok(Some(user(50))), |_| Ok(None), no_active, Utc::now()).unwrap_err();
        assert!(matches!(err, RewardsError::Ledger(LedgerError::InsufficientBalance { .. })));
    }

    #[test]
    fn second_active_game_of_a_kind_is_refused() {
        let live = game();
        let mut changes = ChangeSet::new();
        changes.push_insert(game());
        changes.push_delta(BalanceDelta::new(1, -10, PointType::GameBet, "bet"));

        let err = stage_changes(
            changes,
            |_| Ok(Some(user(50))),
            |_| Ok(None),
            |user_id, kind| Ok((user_id == 1 && kind == GameKind::Mines).then_some(live.id)),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, RewardsError::Wager(WagerError::GameInProgress(_))));

        // Finished rows (roulette spins) are not limited
        let mut done = game();
        done.finish(GameStatus::Completed, GameResultKind::Lose, 0, Utc::now());
        let mut changes = ChangeSet::new();
        changes.push_insert(done);
        let staged = stage_changes(changes, |_| Ok(None), |_| Ok(None), |_, _| Ok(Some(live.id)), Utc::now());
        assert!(staged.is_ok());
    }

    #[test]
    fn stake_check_survives_a_zero_net_change() {
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(1, 0, PointType::GameWin, "push").covering(40));
        assert_eq!(changes.deltas.len(), 1);

        let err = stage_changes(changes.clone(), |_| Ok(Some(user(30))), |_| Ok(None), no_active, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RewardsError::Ledger(LedgerError::InsufficientBalance { .. })));

        let staged = stage_changes(changes, |_| Ok(Some(user(40))), |_| Ok(None), no_active, Utc::now()).unwrap();
        assert!(staged.entries.is_empty());
    }

    #[test]
    fn missing_user_is_reported() {
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(9, 10, PointType::GameWin, "refund"));
        let err = stage_changes(changes, |_| Ok(None), |_| Ok(None), no_active, Utc::now()).unwrap_err();
        assert!(matches!(err, RewardsError::Ledger(LedgerError::UserNotFound(9))));
    }
}
