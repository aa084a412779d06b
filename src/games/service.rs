//! Player-facing wager flows.
//!
//! Each call reads settings and the user, runs the pure game engine, and
//! commits the resulting game write plus balance deltas as one change set.
//! Validation happens before anything is written. The balance and the
//! one-active-game rule are checked again inside the commit, where
//! concurrent requests for the same player are serialised.

use super::blackjack::{BlackjackAction, BlackjackState};
use super::mines::{MinesState, RevealOutcome};
use super::roulette::{self, RouletteBet, RouletteState, SpinOutcome, SpinSettlement};
use super::types::{GameId, GameKind, GameRecord, GameResultKind, GameSettings, GameState, GameStatus};
use crate::clock::Clock;
use crate::errors::{LedgerError, RewardsError, RewardsResult, WagerError};
use crate::ledger::{BalanceDelta, PointType, UserAccount, UserId};
use crate::metrics::MetricsRegistry;
use crate::store::{ChangeSet, CommitReceipt, PointsStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const ROULETTE_WIN: &str = "Rulet Kazancı";
const ROULETTE_LOSS: &str = "Rulet Kaybı";
const BLACKJACK_BET: &str = "Blackjack Bahis";
const BLACKJACK_DOUBLE: &str = "Blackjack Double";
const BLACKJACK_SPLIT: &str = "Blackjack Split";
const BLACKJACK_WIN: &str = "Blackjack Kazancı";
const MINES_BET: &str = "Mines Bahis";
const MINES_WIN: &str = "Mines Kazancı";

/// Result of one roulette spin
#[derive(Debug, Clone, Serialize)]
pub struct SpinReceipt {
    pub game_id: GameId,
    pub outcome: SpinOutcome,
    pub settlement: SpinSettlement,
    pub new_balance: i64,
}

/// Game row after a move, with the player's balance after the commit
#[derive(Debug, Clone, Serialize)]
pub struct GameUpdate {
    pub game: GameRecord,
    pub balance: i64,
}

pub struct GameService {
    store: Arc<dyn PointsStore>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl GameService {
    pub fn new(store: Arc<dyn PointsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            metrics: None,
        }
    }

    /// Deterministic outcomes, for tests and replays
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn PointsStore> {
        &self.store
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }

    fn reject(&self, err: WagerError) -> RewardsError {
        debug!(code = err.code(), reason = %err, "wager rejected");
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(err.code());
        }
        err.into()
    }

    fn record_finished(&self, game: &GameRecord) {
        if let (Some(metrics), Some(result)) = (&self.metrics, game.result) {
            metrics.record_wager(&game.kind.to_string(), result.as_str());
        }
    }

    async fn load_user(&self, user_id: UserId) -> RewardsResult<UserAccount> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("user {}", user_id)))
    }

    /// Load a game owned by `user_id` that still accepts moves
    async fn load_active_game(&self, user_id: UserId, game_id: GameId, kind: GameKind) -> RewardsResult<GameRecord> {
        let game = self
            .store
            .game(game_id)
            .await?
            .filter(|g| g.user_id == user_id && g.kind == kind)
            .ok_or_else(|| RewardsError::NotFound(format!("{} game {}", kind, game_id)))?;
        if !game.is_active() {
            return Err(self.reject(WagerError::InvalidAction(format!("game {} is already settled", game_id))));
        }
        Ok(game)
    }

    fn check_stake(&self, settings: &GameSettings, bet: i64, balance: i64) -> RewardsResult<()> {
        let check = || {
            if !settings.enabled {
                return Err(WagerError::GameDisabled);
            }
            if bet <= 0 {
                return Err(WagerError::InvalidBet(format!("amount must be positive, got {}", bet)));
            }
            if bet < settings.min_bet {
                return Err(WagerError::MinBetNotMet { amount: bet, min: settings.min_bet });
            }
            if bet > settings.max_bet {
                return Err(WagerError::MaxBetExceeded { total: bet, max: settings.max_bet });
            }
            if bet > balance {
                return Err(WagerError::InsufficientBalance { stake: bet, balance });
            }
            Ok(())
        };
        check().map_err(|e| self.reject(e))
    }

    async fn ensure_no_active(&self, user_id: UserId, kind: GameKind) -> RewardsResult<()> {
        if self.store.active_game_for(user_id, kind).await?.is_some() {
            return Err(self.reject(WagerError::GameInProgress(kind.to_string())));
        }
        Ok(())
    }

    /// Report refusals from the commit with the same codes as the up-front checks
    fn commit_rejection(&self, err: RewardsError) -> RewardsError {
        match err {
            RewardsError::Wager(e) => self.reject(e),
            RewardsError::Ledger(LedgerError::InsufficientBalance { balance, delta }) => {
                self.reject(WagerError::InsufficientBalance { stake: -delta, balance })
            }
            other => other,
        }
    }

    async fn commit_game(&self, game_id: GameId, user_id: UserId, changes: ChangeSet) -> RewardsResult<GameUpdate> {
        let receipt: CommitReceipt = self
            .store
            .commit(changes)
            .await
            .map_err(|e| self.commit_rejection(e))?;
        let balance = match receipt.balance_of(user_id) {
            Some(balance) => balance,
            None => self.load_user(user_id).await?.points,
        };
        let game = receipt
            .games
            .into_iter()
            .find(|g| g.id == game_id)
            .ok_or_else(|| RewardsError::NotFound(format!("game {}", game_id)))?;

        if !game.is_active() {
            info!(
                game_id = %game.id,
                user_id,
                kind = %game.kind,
                result = ?game.result,
                payout = game.payout,
                "game settled"
            );
            self.record_finished(&game);
        }
        Ok(GameUpdate { game, balance })
    }

    /// Credit or debit points outside of a game (task rewards, admin corrections)
    pub async fn grant_points(
        &self,
        user_id: UserId,
        amount: i64,
        kind: PointType,
        description: &str,
    ) -> RewardsResult<i64> {
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(user_id, amount, kind, description));
        let receipt = self.store.commit(changes).await?;
        match receipt.balance_of(user_id) {
            Some(balance) => Ok(balance),
            None => Ok(self.load_user(user_id).await?.points),
        }
    }

    pub async fn spin_roulette(&self, user_id: UserId, bets: Vec<RouletteBet>) -> RewardsResult<SpinReceipt> {
        let settings = self.store.game_settings(GameKind::Roulette).await?;
        let user = self.load_user(user_id).await?;
        let total = roulette::validate_bets(&bets, &settings, user.points).map_err(|e| self.reject(e))?;

        let outcome = self.with_rng(|rng| roulette::resolve_outcome(rng));
        let settlement = roulette::settle(&bets, outcome);
        let now = self.clock.now();

        let result = match settlement.net_change {
            n if n > 0 => GameResultKind::Win,
            0 => GameResultKind::Push,
            _ => GameResultKind::Lose,
        };
        let state = GameState::Roulette(RouletteState { bets, outcome });
        let mut record = GameRecord::new_active(user_id, total, state, now);
        record.finish(GameStatus::Completed, result, settlement.total_win, now);
        let game_id = record.id;

        let mut changes = ChangeSet::new();
        changes.push_insert(record);
        let (kind, description) = if settlement.net_change > 0 {
            (PointType::GameWin, ROULETTE_WIN)
        } else {
            (PointType::GameLoss, ROULETTE_LOSS)
        };
        changes.push_delta(
            BalanceDelta::new(user_id, settlement.net_change, kind, description)
                .for_game(game_id)
                .covering(total),
        );

        let update = self.commit_game(game_id, user_id, changes).await?;
        Ok(SpinReceipt {
            game_id,
            outcome,
            settlement,
            new_balance: update.balance,
        })
    }

    pub async fn start_blackjack(&self, user_id: UserId, bet: i64) -> RewardsResult<GameUpdate> {
        let settings = self.store.game_settings(GameKind::Blackjack).await?;
        let user = self.load_user(user_id).await?;
        self.check_stake(&settings, bet, user.points)?;
        self.ensure_no_active(user_id, GameKind::Blackjack).await?;

        let state = self.with_rng(|rng| BlackjackState::deal(rng)).map_err(|e| self.reject(e))?;
        let now = self.clock.now();
        let natural = state.is_finished().then(|| state.settle(bet, 0));

        let mut record = GameRecord::new_active(user_id, bet, GameState::Blackjack(state), now);
        let game_id = record.id;
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(user_id, -bet, PointType::GameBet, BLACKJACK_BET).for_game(game_id));

        if let Some(outcome) = natural {
            record.finish(GameStatus::Completed, outcome.result, outcome.payout, now);
            changes.push_delta(
                BalanceDelta::new(user_id, outcome.payout, PointType::GameWin, BLACKJACK_WIN).for_game(game_id),
            );
        }
        changes.push_insert(record);

        self.commit_game(game_id, user_id, changes).await
    }

    pub async fn blackjack_action(
        &self,
        user_id: UserId,
        game_id: GameId,
        action: BlackjackAction,
    ) -> RewardsResult<GameUpdate> {
        let mut record = self.load_active_game(user_id, game_id, GameKind::Blackjack).await?;
        let GameState::Blackjack(state) = &mut record.state else {
            return Err(self.reject(WagerError::InvalidAction("not a blackjack game".to_string())));
        };

        let extra_stake = match action {
            BlackjackAction::Double | BlackjackAction::Split => record.bet_amount,
            BlackjackAction::Hit | BlackjackAction::Stand => 0,
        };
        if extra_stake > 0 {
            let balance = self.load_user(user_id).await?.points;
            if extra_stake > balance {
                return Err(self.reject(WagerError::InsufficientBalance { stake: extra_stake, balance }));
            }
        }

        state.apply(action).map_err(|e| self.reject(e))?;
        let outcome = state.is_finished().then(|| {
            let split_bet = if action == BlackjackAction::Split { extra_stake } else { record.split_bet_amount };
            state.settle(record.bet_amount, split_bet)
        });

        let now = self.clock.now();
        let mut changes = ChangeSet::new();
        match action {
            BlackjackAction::Double => changes.push_delta(
                BalanceDelta::new(user_id, -extra_stake, PointType::GameBet, BLACKJACK_DOUBLE).for_game(game_id),
            ),
            BlackjackAction::Split => {
                record.split_bet_amount = extra_stake;
                changes.push_delta(
                    BalanceDelta::new(user_id, -extra_stake, PointType::GameBet, BLACKJACK_SPLIT).for_game(game_id),
                );
            }
            _ => {}
        }
        if let Some(outcome) = outcome {
            record.finish(GameStatus::Completed, outcome.result, outcome.payout, now);
            changes.push_delta(
                BalanceDelta::new(user_id, outcome.payout, PointType::GameWin, BLACKJACK_WIN).for_game(game_id),
            );
        }
        changes.push_transition(record);

        self.commit_game(game_id, user_id, changes).await
    }

    pub async fn start_mines(&self, user_id: UserId, bet: i64, mine_count: u8) -> RewardsResult<GameUpdate> {
        let settings = self.store.game_settings(GameKind::Mines).await?;
        let user = self.load_user(user_id).await?;
        self.check_stake(&settings, bet, user.points)?;
        self.ensure_no_active(user_id, GameKind::Mines).await?;

        let state = self
            .with_rng(|rng| MinesState::place(rng, mine_count))
            .map_err(|e| self.reject(e))?;
        let record = GameRecord::new_active(user_id, bet, GameState::Mines(state), self.clock.now());
        let game_id = record.id;

        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(user_id, -bet, PointType::GameBet, MINES_BET).for_game(game_id));
        changes.push_insert(record);

        self.commit_game(game_id, user_id, changes).await
    }

    pub async fn reveal_mine(&self, user_id: UserId, game_id: GameId, cell: u8) -> RewardsResult<GameUpdate> {
        let mut record = self.load_active_game(user_id, game_id, GameKind::Mines).await?;
        let GameState::Mines(state) = &mut record.state else {
            return Err(self.reject(WagerError::InvalidAction("not a mines game".to_string())));
        };

        let revealed = state.reveal(cell).map_err(|e| self.reject(e))?;
        let payout = match revealed {
            RevealOutcome::Safe { board_cleared: true } => {
                Some(state.cash_out_payout(record.bet_amount).map_err(|e| self.reject(e))?)
            }
            _ => None,
        };

        let now = self.clock.now();
        let mut changes = ChangeSet::new();
        match (revealed, payout) {
            (RevealOutcome::Mine, _) => record.finish(GameStatus::Completed, GameResultKind::Lose, 0, now),
            (_, Some(payout)) => {
                record.finish(GameStatus::Completed, GameResultKind::Win, payout, now);
                changes.push_delta(BalanceDelta::new(user_id, payout, PointType::GameWin, MINES_WIN).for_game(game_id));
            }
            _ => {}
        }
        changes.push_transition(record);

        self.commit_game(game_id, user_id, changes).await
    }

    pub async fn cash_out_mines(&self, user_id: UserId, game_id: GameId) -> RewardsResult<GameUpdate> {
        let mut record = self.load_active_game(user_id, game_id, GameKind::Mines).await?;
        let GameState::Mines(state) = &record.state else {
            return Err(self.reject(WagerError::InvalidAction("not a mines game".to_string())));
        };
        let payout = state.cash_out_payout(record.bet_amount).map_err(|e| self.reject(e))?;

        record.finish(GameStatus::Completed, GameResultKind::Win, payout, self.clock.now());
        let mut changes = ChangeSet::new();
        changes.push_delta(BalanceDelta::new(user_id, payout, PointType::GameWin, MINES_WIN).for_game(game_id));
        changes.push_transition(record);

        self.commit_game(game_id, user_id, changes).await
    }
}
