//! API Request and Response Models
//!
//! Player-facing views never expose the shoe, the dealer's hole card or the
//! mine layout of a game that is still running.

use crate::games::blackjack::{hand_value, BlackjackPhase, BlackjackState, Card, HandSlot, Suit};
use crate::games::mines::MinesState;
use crate::games::roulette::{BetResult, Color, RouletteBet, RouletteState};
use crate::games::{GameId, GameKind, GameRecord, GameResultKind, GameState, GameStatus, GameUpdate, SpinReceipt};
use crate::ledger::{PointHistory, PointType, UserAccount, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

impl From<UserAccount> for UserResponse {
    fn from(account: UserAccount) -> Self {
        Self {
            user_id: account.id,
            username: account.username,
            points: account.points,
            created_at: account.created_at,
        }
    }
}

/// Operator credit or debit outside of a game
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRequest {
    pub amount: i64,
    #[serde(default = "default_credit_kind", rename = "type")]
    pub kind: PointType,
    pub description: String,
}

fn default_credit_kind() -> PointType {
    PointType::AdminAdjustment
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub points: i64,
}

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

pub const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub entries: Vec<PointHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpinRequest {
    pub user_id: UserId,
    pub bets: Vec<RouletteBet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpinResultView {
    pub number: u8,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpinResponse {
    pub game_id: GameId,
    pub result: SpinResultView,
    pub total_stake: i64,
    pub total_win: i64,
    pub net_change: i64,
    pub bets: Vec<BetResult>,
    pub new_balance: i64,
}

impl From<SpinReceipt> for SpinResponse {
    fn from(receipt: SpinReceipt) -> Self {
        Self {
            game_id: receipt.game_id,
            result: SpinResultView {
                number: receipt.outcome.number,
                color: receipt.outcome.color,
            },
            total_stake: receipt.settlement.total_stake,
            total_win: receipt.settlement.total_win,
            net_change: receipt.settlement.net_change,
            bets: receipt.settlement.per_bet,
            new_balance: receipt.new_balance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartBlackjackRequest {
    pub user_id: UserId,
    pub bet_amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMinesRequest {
    pub user_id: UserId,
    pub bet_amount: i64,
    pub mine_count: u8,
}

/// Hit, stand, double, split and cash-out all name a game and its owner
#[derive(Debug, Clone, Deserialize)]
pub struct GameActionRequest {
    pub user_id: UserId,
    pub game_id: GameId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevealRequest {
    pub user_id: UserId,
    pub game_id: GameId,
    pub cell: u8,
}

/// A card as the player sees it. Face-down cards carry no rank or suit.
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suit: Option<Suit>,
    pub hidden: bool,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        if card.is_face_down() {
            Self { rank: None, suit: None, hidden: true }
        } else {
            Self {
                rank: Some(card.rank),
                suit: Some(card.suit),
                hidden: false,
            }
        }
    }
}

fn cards(hand: &[Card]) -> Vec<CardView> {
    hand.iter().map(CardView::from).collect()
}

fn visible_value(hand: &[Card]) -> u8 {
    let shown: Vec<Card> = hand.iter().filter(|c| !c.is_face_down()).copied().collect();
    hand_value(&shown).0
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameStateView {
    Blackjack {
        phase: BlackjackPhase,
        player_hand: Vec<CardView>,
        player_value: u8,
        dealer_hand: Vec<CardView>,
        dealer_value: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        split_hand: Option<Vec<CardView>>,
        active_hand: HandSlot,
        doubled: bool,
    },
    Mines {
        mine_count: u8,
        revealed: Vec<u8>,
        multiplier: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        exploded: Option<u8>,
        /// Only disclosed once the round is over
        #[serde(skip_serializing_if = "Option::is_none")]
        mines: Option<Vec<u8>>,
    },
    Roulette(RouletteState),
}

impl GameStateView {
    fn blackjack(state: &BlackjackState) -> Self {
        GameStateView::Blackjack {
            phase: state.phase,
            player_hand: cards(&state.player_hand),
            player_value: hand_value(&state.player_hand).0,
            dealer_hand: cards(&state.dealer_hand),
            dealer_value: visible_value(&state.dealer_hand),
            split_hand: state.split_hand.as_deref().map(cards),
            active_hand: state.active_hand,
            doubled: state.doubled,
        }
    }

    fn mines(state: &MinesState, finished: bool) -> Self {
        GameStateView::Mines {
            mine_count: state.mine_count,
            revealed: state.revealed.clone(),
            multiplier: state.multiplier(),
            exploded: state.exploded,
            mines: finished.then(|| state.mines.clone()),
        }
    }

    pub fn of(record: &GameRecord) -> Self {
        match &record.state {
            GameState::Blackjack(state) => Self::blackjack(state),
            GameState::Mines(state) => Self::mines(state, !record.is_active()),
            GameState::Roulette(state) => GameStateView::Roulette(state.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub game_id: GameId,
    pub user_id: UserId,
    pub kind: GameKind,
    pub status: GameStatus,
    pub bet_amount: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub split_bet_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResultKind>,
    pub payout: i64,
    pub state: GameStateView,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl From<&GameRecord> for GameView {
    fn from(record: &GameRecord) -> Self {
        Self {
            game_id: record.id,
            user_id: record.user_id,
            kind: record.kind,
            status: record.status,
            bet_amount: record.bet_amount,
            split_bet_amount: record.split_bet_amount,
            result: record.result,
            payout: record.payout,
            state: GameStateView::of(record),
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameUpdateResponse {
    pub game: GameView,
    pub balance: i64,
}

impl From<GameUpdate> for GameUpdateResponse {
    fn from(update: GameUpdate) -> Self {
        Self {
            game: GameView::from(&update.game),
            balance: update.balance,
        }
    }
}
