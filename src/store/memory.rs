//! Process-local store for tests and ephemeral runs

use super::{
    decode_cursor, encode_cursor, stage_changes, ChangeSet, CommitReceipt, HistoryPage, PointsStore,
    UserAccount,
};
use crate::clock::{Clock, SystemClock};
use crate::errors::RewardsResult;
use crate::games::types::{GameId, GameKind, GameRecord, GameSettings};
use crate::ledger::{PointHistory, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, UserAccount>,
    games: HashMap<GameId, GameRecord>,
    /// Per-user ledger in seq order
    ledger: HashMap<UserId, Vec<PointHistory>>,
    settings: HashMap<GameKind, GameSettings>,
}

impl Tables {
    fn active_game(&self, user_id: UserId, kind: GameKind) -> Option<&GameRecord> {
        self.games
            .values()
            .find(|g| g.user_id == user_id && g.kind == kind && g.is_active())
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Ledger rows and user creation times are stamped from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }

    /// Write a game row as-is, bypassing the ledger. Used to seed imported data.
    pub async fn import_game(&self, record: GameRecord) {
        self.tables.write().await.games.insert(record.id, record);
    }
}

#[async_trait]
impl PointsStore for MemoryStore {
    async fn create_user(&self, id: UserId, username: Option<String>) -> RewardsResult<UserAccount> {
        let mut tables = self.tables.write().await;
        let now = self.clock.now();
        let user = tables
            .users
            .entry(id)
            .or_insert_with(|| UserAccount::new(id, username, now));
        Ok(user.clone())
    }

    async fn user(&self, id: UserId) -> RewardsResult<Option<UserAccount>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn game(&self, id: GameId) -> RewardsResult<Option<GameRecord>> {
        Ok(self.tables.read().await.games.get(&id).cloned())
    }

    async fn stale_games(
        &self,
        kind: GameKind,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> RewardsResult<Vec<GameRecord>> {
        let tables = self.tables.read().await;
        let mut games: Vec<GameRecord> = tables
            .games
            .values()
            .filter(|g| g.kind == kind && g.is_active() && g.created_at < created_before)
            .cloned()
            .collect();
        games.sort_by_key(|g| (g.created_at, g.id));
        games.truncate(limit);
        Ok(games)
    }

    async fn active_game_for(&self, user_id: UserId, kind: GameKind) -> RewardsResult<Option<GameRecord>> {
        Ok(self.tables.read().await.active_game(user_id, kind).cloned())
    }

    async fn history(&self, user_id: UserId, cursor: Option<&str>, limit: usize) -> RewardsResult<HistoryPage> {
        let before_seq = cursor.map(decode_cursor).transpose()?;
        let tables = self.tables.read().await;
        let Some(rows) = tables.ledger.get(&user_id) else {
            return Ok(HistoryPage::default());
        };

        let entries: Vec<PointHistory> = rows
            .iter()
            .rev()
            .filter(|e| before_seq.map_or(true, |seq| e.seq < seq))
            .take(limit.max(1))
            .cloned()
            .collect();

        let next_cursor = match entries.last() {
            Some(last) if last.seq > 1 && entries.len() == limit.max(1) => Some(encode_cursor(last.seq)),
            _ => None,
        };
        Ok(HistoryPage { entries, next_cursor })
    }

    async fn stored_game_settings(&self, kind: GameKind) -> RewardsResult<Option<GameSettings>> {
        Ok(self.tables.read().await.settings.get(&kind).cloned())
    }

    async fn put_game_settings(&self, kind: GameKind, settings: GameSettings) -> RewardsResult<()> {
        self.tables.write().await.settings.insert(kind, settings);
        Ok(())
    }

    async fn commit(&self, changes: ChangeSet) -> RewardsResult<CommitReceipt> {
        let mut tables = self.tables.write().await;
        let now = self.clock.now();

        let staged = {
            let snapshot = &*tables;
            stage_changes(
                changes,
                |id| Ok(snapshot.users.get(&id).cloned()),
                |id| Ok(snapshot.games.get(&id).cloned()),
                |user_id, kind| Ok(snapshot.active_game(user_id, kind).map(|g| g.id)),
                now,
            )?
        };

        for (id, user) in &staged.users {
            tables.users.insert(*id, user.clone());
        }
        for (_, record) in &staged.games {
            tables.games.insert(record.id, record.clone());
        }
        for entry in &staged.entries {
            tables.ledger.entry(entry.user_id).or_default().push(entry.clone());
        }

        Ok(staged.into_receipt())
    }
}
