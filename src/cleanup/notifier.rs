//! Outbound notice after a stale game is settled.
//!
//! Delivery is best effort: the scanner bounds every call with a timeout and
//! never lets a failed notice undo or block a settlement.

use crate::errors::RewardsResult;
use crate::games::settlement::SettlementDecision;
use crate::games::types::{GameId, GameKind};
use crate::ledger::UserId;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementEvent {
    pub game_id: GameId,
    pub user_id: UserId,
    pub kind: GameKind,
    pub decision: SettlementDecision,
    /// Balance after the commit, when the settlement touched it
    pub new_balance: Option<i64>,
}

#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn notify(&self, event: &SettlementEvent) -> RewardsResult<()>;
}

/// Writes each settlement to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl SettlementNotifier for TracingNotifier {
    async fn notify(&self, event: &SettlementEvent) -> RewardsResult<()> {
        tracing::info!(
            game_id = %event.game_id,
            user_id = event.user_id,
            kind = %event.kind,
            action = event.decision.label(),
            new_balance = ?event.new_balance,
            "stale game settled"
        );
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SettlementEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SettlementEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
    async fn notify(&self, event: &SettlementEvent) -> RewardsResult<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
