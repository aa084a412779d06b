//! Shared fixtures for integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pointvault::errors::RewardsResult;
use pointvault::games::{GameId, GameKind, GameRecord, GameSettings};
use pointvault::ledger::{UserAccount, UserId};
use pointvault::store::{ChangeSet, CommitReceipt, HistoryPage, MemoryStore, PointsStore};

/// In-memory store that yields to the scheduler before every call, so
/// requests joined on one task interleave between their reads and commit.
#[derive(Default)]
pub struct YieldingStore {
    inner: MemoryStore,
}

impl YieldingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PointsStore for YieldingStore {
    async fn create_user(&self, id: UserId, username: Option<String>) -> RewardsResult<UserAccount> {
        tokio::task::yield_now().await;
        self.inner.create_user(id, username).await
    }

    async fn user(&self, id: UserId) -> RewardsResult<Option<UserAccount>> {
        tokio::task::yield_now().await;
        self.inner.user(id).await
    }

    async fn game(&self, id: GameId) -> RewardsResult<Option<GameRecord>> {
        tokio::task::yield_now().await;
        self.inner.game(id).await
    }

    async fn stale_games(
        &self,
        kind: GameKind,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> RewardsResult<Vec<GameRecord>> {
        tokio::task::yield_now().await;
        self.inner.stale_games(kind, created_before, limit).await
    }

    async fn active_game_for(&self, user_id: UserId, kind: GameKind) -> RewardsResult<Option<GameRecord>> {
        tokio::task::yield_now().await;
        self.inner.active_game_for(user_id, kind).await
    }

    async fn history(&self, user_id: UserId, cursor: Option<&str>, limit: usize) -> RewardsResult<HistoryPage> {
        tokio::task::yield_now().await;
        self.inner.history(user_id, cursor, limit).await
    }

    async fn stored_game_settings(&self, kind: GameKind) -> RewardsResult<Option<GameSettings>> {
        tokio::task::yield_now().await;
        self.inner.stored_game_settings(kind).await
    }

    async fn put_game_settings(&self, kind: GameKind, settings: GameSettings) -> RewardsResult<()> {
        tokio::task::yield_now().await;
        self.inner.put_game_settings(kind, settings).await
    }

    async fn commit(&self, changes: ChangeSet) -> RewardsResult<CommitReceipt> {
        tokio::task::yield_now().await;
        self.inner.commit(changes).await
    }
}
