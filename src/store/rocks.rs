//! RocksDB-backed store.
//!
//! Rows are JSON-encoded. Active games are indexed twice: by kind and
//! creation time for the stale scan, and by owner for the one-game-per-user
//! check. Index entries are written and removed in the same batch as the row.

use super::{
    decode_cursor, encode_cursor, stage_changes, ChangeSet, CommitReceipt, HistoryPage, PointsStore,
    UserAccount,
};
use crate::clock::{Clock, SystemClock};
use crate::errors::{RewardsResult, StorageError};
use crate::games::types::{GameId, GameKind, GameRecord, GameSettings};
use crate::ledger::{PointHistory, UserId};
use crate::storage::OptimizedStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const USER_PREFIX: &[u8] = b"user:";
const GAME_PREFIX: &[u8] = b"game:rec:";
const ACTIVE_BY_KIND_PREFIX: &str = "game:active:";
const ACTIVE_BY_OWNER_PREFIX: &str = "game:owner:";
const LEDGER_PREFIX: &[u8] = b"ledger:";
const SETTINGS_PREFIX: &str = "settings:";

fn user_key(id: UserId) -> Vec<u8> {
    let mut key = USER_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn game_key(id: GameId) -> Vec<u8> {
    let mut key = GAME_PREFIX.to_vec();
    key.extend_from_slice(id.as_bytes());
    key
}

fn active_kind_prefix(kind: GameKind) -> Vec<u8> {
    format!("{}{}:", ACTIVE_BY_KIND_PREFIX, kind).into_bytes()
}

/// Key layout: prefix | created_at millis (be) | game id
fn active_kind_key(record: &GameRecord) -> Vec<u8> {
    let millis = record.created_at.timestamp_millis().max(0) as u64;
    let mut key = active_kind_prefix(record.kind);
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(record.id.as_bytes());
    key
}

fn active_owner_prefix(user_id: UserId, kind: GameKind) -> Vec<u8> {
    let mut key = format!("{}{}:", ACTIVE_BY_OWNER_PREFIX, kind).into_bytes();
    key.extend_from_slice(&user_id.to_be_bytes());
    key
}

fn active_owner_key(record: &GameRecord) -> Vec<u8> {
    let mut key = active_owner_prefix(record.user_id, record.kind);
    key.extend_from_slice(record.id.as_bytes());
    key
}

fn ledger_prefix(user_id: UserId) -> Vec<u8> {
    let mut key = LEDGER_PREFIX.to_vec();
    key.extend_from_slice(&user_id.to_be_bytes());
    key
}

/// Sort newest-first by storing the inverted seq
fn ledger_key(user_id: UserId, seq: u64) -> Vec<u8> {
    let mut key = ledger_prefix(user_id);
    key.extend_from_slice(&(u64::MAX - seq).to_be_bytes());
    key
}

fn settings_key(kind: GameKind) -> Vec<u8> {
    format!("{}{}", SETTINGS_PREFIX, kind).into_bytes()
}

fn encode<T: Serialize>(value: &T, what: &str) -> RewardsResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)).into())
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> RewardsResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)).into())
}

fn game_id_suffix(key: &[u8]) -> Option<GameId> {
    let off = key.len().checked_sub(16)?;
    Uuid::from_slice(&key[off..]).ok()
}

/// RocksDB calls are blocking and run on the calling task, so a
/// `tokio::time::timeout` around a store call cannot cut one short.
pub struct RocksStore {
    storage: OptimizedStorage,
    /// Serialises commits so staging reads see every earlier write
    commit_gate: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> RewardsResult<Self> {
        Ok(Self::new(OptimizedStorage::new(path)?))
    }

    pub fn new(storage: OptimizedStorage) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: OptimizedStorage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            commit_gate: Mutex::new(()),
            clock,
        }
    }

    fn load_user(&self, id: UserId) -> RewardsResult<Option<UserAccount>> {
        self.storage
            .get(&user_key(id))?
            .map(|bytes| decode(&bytes, &format!("user {}", id)))
            .transpose()
    }

    fn load_game(&self, id: GameId) -> RewardsResult<Option<GameRecord>> {
        self.storage
            .get(&game_key(id))?
            .map(|bytes| decode(&bytes, &format!("game {}", id)))
            .transpose()
    }

    fn load_active_game(&self, user_id: UserId, kind: GameKind) -> RewardsResult<Option<GameRecord>> {
        let rows = self.storage.scan_prefix(&active_owner_prefix(user_id, kind), None, 1)?;
        let Some(id) = rows.first().and_then(|(key, _)| game_id_suffix(key)) else {
            return Ok(None);
        };
        Ok(self.load_game(id)?.filter(GameRecord::is_active))
    }

    /// Write a game row and its index entries as-is, bypassing the ledger.
    /// Used to seed imported data.
    pub async fn import_game(&self, record: &GameRecord) -> RewardsResult<()> {
        let _gate = self.commit_gate.lock().await;
        let mut puts = vec![(game_key(record.id), encode(record, "game")?)];
        if record.is_active() {
            puts.push((active_kind_key(record), Vec::new()));
            puts.push((active_owner_key(record), Vec::new()));
        }
        self.storage.batch_write(&puts, &[])
    }
}

#[async_trait]
impl PointsStore for RocksStore {
    async fn create_user(&self, id: UserId, username: Option<String>) -> RewardsResult<UserAccount> {
        let _gate = self.commit_gate.lock().await;
        if let Some(existing) = self.load_user(id)? {
            return Ok(existing);
        }
        let user = UserAccount::new(id, username, self.clock.now());
        self.storage.put(&user_key(id), &encode(&user, "user")?)?;
        Ok(user)
    }

    async fn user(&self, id: UserId) -> RewardsResult<Option<UserAccount>> {
        self.load_user(id)
    }

    async fn game(&self, id: GameId) -> RewardsResult<Option<GameRecord>> {
        self.load_game(id)
    }

    async fn stale_games(
        &self,
        kind: GameKind,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> RewardsResult<Vec<GameRecord>> {
        let rows = self.storage.scan_prefix(&active_kind_prefix(kind), None, limit.max(1))?;

        let mut games = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let Some(id) = game_id_suffix(&key) else {
                tracing::warn!(key = %hex::encode(&key), "skipping malformed active index key");
                continue;
            };
            match self.load_game(id)? {
                Some(game) if game.is_active() => {
                    if game.created_at >= created_before {
                        break;
                    }
                    games.push(game);
                }
                _ => tracing::warn!(game_id = %id, "active index points at a settled or missing game"),
            }
        }
        Ok(games)
    }

    async fn active_game_for(&self, user_id: UserId, kind: GameKind) -> RewardsResult<Option<GameRecord>> {
        self.load_active_game(user_id, kind)
    }

    async fn history(&self, user_id: UserId, cursor: Option<&str>, limit: usize) -> RewardsResult<HistoryPage> {
        let limit = limit.max(1);
        let start_after = cursor
            .map(decode_cursor)
            .transpose()?
            .map(|seq| ledger_key(user_id, seq));

        let rows = self
            .storage
            .scan_prefix(&ledger_prefix(user_id), start_after.as_deref(), limit)?;
        let entries = rows
            .iter()
            .map(|(_, value)| decode::<PointHistory>(value, "ledger entry"))
            .collect::<RewardsResult<Vec<_>>>()?;

        let next_cursor = match entries.last() {
            Some(last) if last.seq > 1 && entries.len() == limit => Some(encode_cursor(last.seq)),
            _ => None,
        };
        Ok(HistoryPage { entries, next_cursor })
    }

    async fn stored_game_settings(&self, kind: GameKind) -> RewardsResult<Option<GameSettings>> {
        self.storage
            .get(&settings_key(kind))?
            .map(|bytes| decode(&bytes, "game settings"))
            .transpose()
    }

    async fn put_game_settings(&self, kind: GameKind, settings: GameSettings) -> RewardsResult<()> {
        self.storage.put(&settings_key(kind), &encode(&settings, "game settings")?)
    }

    async fn commit(&self, changes: ChangeSet) -> RewardsResult<CommitReceipt> {
        let _gate = self.commit_gate.lock().await;
        let now = self.clock.now();

        let staged = stage_changes(
            changes,
            |id| self.load_user(id),
            |id| self.load_game(id),
            |user_id, kind| Ok(self.load_active_game(user_id, kind)?.map(|g| g.id)),
            now,
        )?;

        let mut puts: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut deletes: Vec<Vec<u8>> = Vec::new();

        for (id, user) in &staged.users {
            puts.push((user_key(*id), encode(user, "user")?));
        }
        for (previous, record) in &staged.games {
            puts.push((game_key(record.id), encode(record, "game")?));
            let was_active = previous.as_ref().is_some_and(GameRecord::is_active);
            match (was_active, record.is_active()) {
                (false, true) => {
                    puts.push((active_kind_key(record), Vec::new()));
                    puts.push((active_owner_key(record), Vec::new()));
                }
                (true, false) => {
                    deletes.push(active_kind_key(record));
                    deletes.push(active_owner_key(record));
                }
                _ => {}
            }
        }
        for entry in &staged.entries {
            puts.push((ledger_key(entry.user_id, entry.seq), encode(entry, "ledger entry")?));
        }

        self.storage.batch_write(&puts, &deletes)?;
        tracing::debug!(
            games = staged.games.len(),
            entries = staged.entries.len(),
            "commit applied"
        );
        Ok(staged.into_receipt())
    }
}
