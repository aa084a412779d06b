use super::blackjack::BlackjackState;
use super::mines::MinesState;
use super::play_detection;
use super::roulette::RouletteState;
use crate::ledger::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type GameId = Uuid;

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Blackjack,
    Mines,
    Roulette,
}

impl GameKind {
    pub const ALL: [GameKind; 3] = [GameKind::Blackjack, GameKind::Mines, GameKind::Roulette];

    /// Kinds whose games stay open between player actions and can go stale
    pub const SESSION_GAMES: [GameKind; 2] = [GameKind::Blackjack, GameKind::Mines];

    pub fn label(&self) -> &'static str {
        match self {
            GameKind::Blackjack => "Blackjack",
            GameKind::Mines => "Mines",
            GameKind::Roulette => "Roulette",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Blackjack => write!(f, "blackjack"),
            GameKind::Mines => write!(f, "mines"),
            GameKind::Roulette => write!(f, "roulette"),
        }
    }
}

impl FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blackjack" => Ok(GameKind::Blackjack),
            "mines" => Ok(GameKind::Mines),
            "roulette" => Ok(GameKind::Roulette),
            other => Err(format!("unknown game kind: {}", other)),
        }
    }
}

/// Lifecycle status; anything but `Active` is terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Completed,
    Cancelled,
    Timeout,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Active)
    }
}

/// Outcome recorded at settlement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResultKind {
    Win,
    Lose,
    Push,
    Blackjack,
    Timeout,
}

impl GameResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResultKind::Win => "win",
            GameResultKind::Lose => "lose",
            GameResultKind::Push => "push",
            GameResultKind::Blackjack => "blackjack",
            GameResultKind::Timeout => "timeout",
        }
    }
}

/// Per-game wager limits read before accepting a bet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameSettings {
    pub enabled: bool,
    pub min_bet: i64,
    pub max_bet: i64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bet: 10,
            max_bet: 10_000,
        }
    }
}

/// Game-specific snapshot (discriminated union)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameState {
    Blackjack(BlackjackState),
    Mines(MinesState),
    Roulette(RouletteState),
}

impl GameState {
    pub fn kind(&self) -> GameKind {
        match self {
            GameState::Blackjack(_) => GameKind::Blackjack,
            GameState::Mines(_) => GameKind::Mines,
            GameState::Roulette(_) => GameKind::Roulette,
        }
    }
}

/// Persisted game row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRecord {
    pub id: GameId,
    pub user_id: UserId,
    pub kind: GameKind,
    pub status: GameStatus,
    pub bet_amount: i64,
    #[serde(default)]
    pub split_bet_amount: i64,
    pub state: GameState,
    /// Snapshot imported from the previous system, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_state_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResultKind>,
    pub payout: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every write; conditional updates compare it
    #[serde(default)]
    pub revision: u64,
}

impl GameRecord {
    pub fn new_active(user_id: UserId, bet_amount: i64, state: GameState, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: state.kind(),
            status: GameStatus::Active,
            bet_amount,
            split_bet_amount: 0,
            state,
            legacy_state_json: None,
            result: None,
            payout: 0,
            created_at: now,
            completed_at: None,
            revision: 0,
        }
    }

    /// Move to a terminal status. Callers persist this as a conditional transition.
    pub fn finish(&mut self, status: GameStatus, result: GameResultKind, payout: i64, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.result = Some(result);
        self.payout = payout;
        self.completed_at = Some(now);
    }

    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }

    /// Points the player has put at risk on this game
    pub fn total_stake(&self) -> i64 {
        match &self.state {
            GameState::Blackjack(state) => {
                let main = if state.doubled { self.bet_amount * 2 } else { self.bet_amount };
                main + self.split_bet_amount
            }
            _ => self.bet_amount,
        }
    }

    /// Whether the player took any action since the game was created
    pub fn played(&self) -> bool {
        match self.legacy_state_json.as_deref() {
            Some(json) => play_detection::has_played_legacy(self.kind, Some(json)),
            None => play_detection::has_played(&self.state),
        }
    }

    /// `status == active` iff `completed_at` is unset iff `result` is unset
    pub fn check_invariants(&self) -> Result<(), String> {
        let active = self.status == GameStatus::Active;
        if active != self.completed_at.is_none() || active != self.result.is_none() {
            return Err(format!(
                "game {} has status {:?} with completed_at={:?} result={:?}",
                self.id, self.status, self.completed_at, self.result
            ));
        }
        if self.kind != self.state.kind() {
            return Err(format!("game {} kind {} does not match its state", self.id, self.kind));
        }
        if self.bet_amount < 0 || self.split_bet_amount < 0 || self.payout < 0 {
            return Err(format!("game {} carries a negative amount", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::mines::MinesState;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in GameKind::ALL {
            assert_eq!(kind.to_string().parse::<GameKind>().unwrap(), kind);
        }
        assert!("poker".parse::<GameKind>().is_err());
    }

    #[test]
    fn finish_satisfies_invariants() {
        let state = GameState::Mines(MinesState::new(3, vec![0, 1, 2]));
        let mut game = GameRecord::new_active(1, 100, state, Utc::now());
        assert!(game.check_invariants().is_ok());

        game.finish(GameStatus::Completed, GameResultKind::Lose, 0, Utc::now());
        assert!(game.check_invariants().is_ok());

        game.completed_at = None;
        assert!(game.check_invariants().is_err());
    }
}
