//! Stale game scanner: finds abandoned blackjack and mines games and settles
//! each one in its own commit.
//!
//! One game failing never aborts the batch. Only a failed candidate query
//! fails the run, and the next run picks up where this one stopped because
//! settled games drop out of the active set.

use super::notifier::{SettlementEvent, SettlementNotifier};
use crate::clock::Clock;
use crate::config::CleanupConfig;
use crate::errors::{LedgerError, RewardsError, RewardsResult, StorageError};
use crate::games::settlement::{self, SettlementDecision};
use crate::games::types::{GameId, GameKind, GameRecord};
use crate::ledger::UserId;
use crate::metrics::MetricsRegistry;
use crate::store::PointsStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub stale_after: chrono::Duration,
    pub max_concurrency: usize,
    pub batch_limit: usize,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::from(&CleanupConfig::default())
    }
}

impl From<&CleanupConfig> for ScannerConfig {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            stale_after: chrono::Duration::seconds(config.stale_after_secs as i64),
            max_concurrency: config.max_concurrency.max(1),
            batch_limit: config.batch_limit.max(1),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            notify_timeout: Duration::from_millis(config.notify_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SettlementAction {
    Refunded { amount: i64 },
    ForcedLoss,
    /// Another writer settled or moved the game first
    AlreadySettled,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSettlementOutcome {
    pub game_id: GameId,
    pub user_id: UserId,
    pub kind: GameKind,
    #[serde(flatten)]
    pub action: SettlementAction,
}

/// Summary of one scanner run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Games moved to a terminal status by this run
    pub cleaned_count: usize,
    pub refunded_total: i64,
    pub refunds: usize,
    pub forced_losses: usize,
    pub skipped: usize,
    pub failed: usize,
    pub per_game: Vec<GameSettlementOutcome>,
}

impl CleanupReport {
    fn record(&mut self, outcome: GameSettlementOutcome) {
        match &outcome.action {
            SettlementAction::Refunded { amount } => {
                self.cleaned_count += 1;
                self.refunds += 1;
                self.refunded_total += amount;
            }
            SettlementAction::ForcedLoss => {
                self.cleaned_count += 1;
                self.forced_losses += 1;
            }
            SettlementAction::AlreadySettled | SettlementAction::Skipped { .. } => self.skipped += 1,
            SettlementAction::Failed { .. } => self.failed += 1,
        }
        self.per_game.push(outcome);
    }
}

/// Bounds time spent waiting on the store. Only fires at an await point, so a
/// backend that blocks inside a call (RocksDB) runs to completion first.
async fn with_timeout<T, F>(limit: Duration, fut: F) -> RewardsResult<T>
where
    F: Future<Output = RewardsResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(limit.as_millis() as u64).into()),
    }
}

pub struct StaleGameScanner {
    store: Arc<dyn PointsStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn SettlementNotifier>,
    config: ScannerConfig,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl StaleGameScanner {
    pub fn new(
        store: Arc<dyn PointsStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn SettlementNotifier>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan once and settle every stale game found
    pub async fn run_once(&self) -> RewardsResult<CleanupReport> {
        let started = Instant::now();
        let result = self.scan_and_settle().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_cleanup_run(result.is_ok(), started.elapsed());
        }
        result
    }

    async fn scan_and_settle(&self) -> RewardsResult<CleanupReport> {
        let now = self.clock.now();
        let threshold = settlement::stale_threshold(now, self.config.stale_after);

        let mut candidates: Vec<GameRecord> = Vec::new();
        for kind in GameKind::SESSION_GAMES {
            let games = with_timeout(
                self.config.store_timeout,
                self.store.stale_games(kind, threshold, self.config.batch_limit),
            )
            .await
            .map_err(|e| {
                error!(%kind, error = %e, "stale game query failed");
                e
            })?;
            candidates.extend(games);
        }

        let mut report = CleanupReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }

        info!(candidates = candidates.len(), %threshold, "settling stale games");
        let outcomes: Vec<GameSettlementOutcome> = stream::iter(candidates)
            .map(|game| self.settle_one(game, now))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            report.record(outcome);
        }

        info!(
            cleaned = report.cleaned_count,
            refunded_total = report.refunded_total,
            forced_losses = report.forced_losses,
            skipped = report.skipped,
            failed = report.failed,
            "stale game cleanup finished"
        );
        Ok(report)
    }

    async fn settle_one(&self, game: GameRecord, now: DateTime<Utc>) -> GameSettlementOutcome {
        let decision = settlement::decide(&game, now, self.config.stale_after);
        let action = self.apply_decision(&game, &decision, now).await;

        if let Some(metrics) = &self.metrics {
            let (label, refunded) = match &action {
                SettlementAction::Refunded { amount } => ("refund", *amount),
                SettlementAction::ForcedLoss => ("force_loss", 0),
                SettlementAction::AlreadySettled => ("conflict", 0),
                SettlementAction::Skipped { .. } => ("skipped", 0),
                SettlementAction::Failed { .. } => ("failed", 0),
            };
            metrics.record_settlement(label, refunded);
        }

        GameSettlementOutcome {
            game_id: game.id,
            user_id: game.user_id,
            kind: game.kind,
            action,
        }
    }

    async fn apply_decision(
        &self,
        game: &GameRecord,
        decision: &SettlementDecision,
        now: DateTime<Utc>,
    ) -> SettlementAction {
        let Some(changes) = settlement::plan(game, decision, now) else {
            let reason = match decision {
                SettlementDecision::LeaveActive { reason } => reason.clone(),
                _ => "nothing to write".to_string(),
            };
            return SettlementAction::Skipped { reason };
        };

        let receipt = match with_timeout(self.config.store_timeout, self.store.commit(changes)).await {
            Ok(receipt) => receipt,
            Err(RewardsError::Conflict { .. }) => {
                info!(game_id = %game.id, "game changed before settlement, skipping");
                return SettlementAction::AlreadySettled;
            }
            Err(RewardsError::Ledger(LedgerError::UserNotFound(user_id))) => {
                error!(
                    game_id = %game.id,
                    user_id,
                    "refund target user is missing, leaving game active for manual review"
                );
                return SettlementAction::Failed {
                    error: format!("user {} not found", user_id),
                };
            }
            Err(e) => {
                warn!(game_id = %game.id, error = %e, "settlement failed, will retry next run");
                return SettlementAction::Failed { error: e.to_string() };
            }
        };

        let event = SettlementEvent {
            game_id: game.id,
            user_id: game.user_id,
            kind: game.kind,
            decision: decision.clone(),
            new_balance: receipt.balance_of(game.user_id),
        };
        match tokio::time::timeout(self.config.notify_timeout, self.notifier.notify(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(game_id = %game.id, error = %e, "settlement notice failed"),
            Err(_) => warn!(game_id = %game.id, "settlement notice timed out"),
        }

        match decision {
            SettlementDecision::Refund { amount } => SettlementAction::Refunded { amount: *amount },
            SettlementDecision::ForceLoss => SettlementAction::ForcedLoss,
            SettlementDecision::LeaveActive { reason } => SettlementAction::Skipped { reason: reason.clone() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::cleanup::notifier::RecordingNotifier;
    use crate::games::mines::MinesState;
    use crate::games::types::{GameState, GameStatus};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn refunds_untouched_mines_and_notifies() {
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        store.create_user(3, None).await.unwrap();

        let game = GameRecord::new_active(3, 80, GameState::Mines(MinesState::new(2, vec![3, 4])), start);
        let game_id = game.id;
        store.import_game(game).await;
        clock.advance(chrono::Duration::minutes(31));

        let notifier = Arc::new(RecordingNotifier::default());
        let scanner = StaleGameScanner::new(store.clone(), clock.clone(), notifier.clone(), ScannerConfig::default());
        let report = scanner.run_once().await.unwrap();

        assert_eq!(report.cleaned_count, 1);
        assert_eq!(report.refunded_total, 80);
        assert_eq!(store.user(3).await.unwrap().unwrap().points, 80);
        assert_eq!(store.game(game_id).await.unwrap().unwrap().status, GameStatus::Timeout);

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].new_balance, Some(80));
    }

    #[test]
    fn report_counts_actions() {
        let mut report = CleanupReport::default();
        let outcome = |action| GameSettlementOutcome {
            game_id: uuid::Uuid::new_v4(),
            user_id: 1,
            kind: GameKind::Mines,
            action,
        };
        report.record(outcome(SettlementAction::Refunded { amount: 10 }));
        report.record(outcome(SettlementAction::ForcedLoss));
        report.record(outcome(SettlementAction::AlreadySettled));
        report.record(outcome(SettlementAction::Failed { error: "disk".into() }));

        assert_eq!(report.cleaned_count, 2);
        assert_eq!(report.refunded_total, 10);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.per_game.len(), 4);
    }
}
