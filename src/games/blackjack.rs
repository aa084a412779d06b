//! Single-deck blackjack with double down and one split.
//!
//! The shuffled shoe lives in the state so a round can be resumed across
//! requests. Dealer stands on every 17. Naturals pay 3:2.

use super::types::GameResultKind;
use crate::errors::WagerError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

const SUITS: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    /// 1 = Ace, 2-10, 11 = J, 12 = Q, 13 = K
    pub rank: u8,
    pub suit: Suit,
    /// Only set on the dealer's hole card: `true` while face down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl Card {
    pub fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit, hidden: None }
    }

    fn face_down(mut self) -> Self {
        self.hidden = Some(true);
        self
    }

    pub fn is_face_down(&self) -> bool {
        self.hidden == Some(true)
    }
}

/// Best total for a hand and whether an ace is still counted as 11
pub fn hand_value(cards: &[Card]) -> (u8, bool) {
    let mut value: u16 = 0;
    let mut aces: u8 = 0;

    for card in cards {
        match card.rank {
            1 => {
                aces += 1;
                value += 11;
            }
            r if r >= 10 => value += 10,
            r => value += r as u16,
        }
    }

    while value > 21 && aces > 0 {
        value -= 10;
        aces -= 1;
    }

    (value.min(255) as u8, aces > 0)
}

pub fn is_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards).0 == 21
}

pub fn is_bust(cards: &[Card]) -> bool {
    hand_value(cards).0 > 21
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlackjackPhase {
    Playing,
    DealerTurn,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandSlot {
    #[default]
    Main,
    Split,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlackjackAction {
    Hit,
    Stand,
    Double,
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlackjackState {
    pub phase: BlackjackPhase,
    pub player_hand: Vec<Card>,
    pub dealer_hand: Vec<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_hand: Option<Vec<Card>>,
    #[serde(default)]
    pub active_hand: HandSlot,
    #[serde(default)]
    pub doubled: bool,
    /// Remaining shoe, top card last
    #[serde(default)]
    pub deck: Vec<Card>,
}

/// What a finished round pays back, stake included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub payout: i64,
    pub result: GameResultKind,
}

pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck: Vec<Card> = SUITS
        .iter()
        .flat_map(|&suit| (1..=13).map(move |rank| Card::new(rank, suit)))
        .collect();
    deck.shuffle(rng);
    deck
}

impl BlackjackState {
    /// State right after the deal, before any natural check
    pub fn dealt(player_hand: Vec<Card>, dealer_hand: Vec<Card>, deck: Vec<Card>) -> Self {
        Self {
            phase: BlackjackPhase::Playing,
            player_hand,
            dealer_hand,
            split_hand: None,
            active_hand: HandSlot::Main,
            doubled: false,
            deck,
        }
    }

    /// Deal two cards each from a fresh shoe; the dealer's second card is face down.
    ///
    /// A natural on either side finishes the round on the spot.
    pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> Result<Self, WagerError> {
        Self::deal_from(shuffled_deck(rng))
    }

    pub fn deal_from(deck: Vec<Card>) -> Result<Self, WagerError> {
        let mut state = Self::dealt(Vec::new(), Vec::new(), deck);
        let p1 = state.draw()?;
        let d1 = state.draw()?;
        let p2 = state.draw()?;
        let d2 = state.draw()?;
        state.player_hand = vec![p1, p2];
        state.dealer_hand = vec![d1, d2.face_down()];

        if is_blackjack(&state.player_hand) || is_blackjack(&state.dealer_hand) {
            state.reveal_hole_card();
            state.phase = BlackjackPhase::Finished;
        }
        Ok(state)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == BlackjackPhase::Finished
    }

    fn draw(&mut self) -> Result<Card, WagerError> {
        self.deck
            .pop()
            .ok_or_else(|| WagerError::InvalidAction("shoe is empty".to_string()))
    }

    fn active_cards(&mut self) -> &mut Vec<Card> {
        match (self.active_hand, self.split_hand.as_mut()) {
            (HandSlot::Split, Some(split)) => split,
            _ => &mut self.player_hand,
        }
    }

    fn reveal_hole_card(&mut self) {
        for card in &mut self.dealer_hand {
            if card.is_face_down() {
                card.hidden = Some(false);
            }
        }
    }

    pub fn can_double(&self) -> bool {
        self.phase == BlackjackPhase::Playing
            && self.active_hand == HandSlot::Main
            && self.split_hand.is_none()
            && !self.doubled
            && self.player_hand.len() == 2
    }

    pub fn can_split(&self) -> bool {
        self.phase == BlackjackPhase::Playing
            && self.active_hand == HandSlot::Main
            && self.split_hand.is_none()
            && !self.doubled
            && self.player_hand.len() == 2
            && self.player_hand[0].rank == self.player_hand[1].rank
    }

    /// Apply one player move. Finishing the last hand plays out the dealer.
    pub fn apply(&mut self, action: BlackjackAction) -> Result<(), WagerError> {
        if self.phase != BlackjackPhase::Playing {
            return Err(WagerError::InvalidAction("round is not accepting moves".to_string()));
        }

        match action {
            BlackjackAction::Hit => {
                let card = self.draw()?;
                let hand = self.active_cards();
                hand.push(card);
                if hand_value(hand).0 >= 21 {
                    self.finish_active_hand();
                }
            }
            BlackjackAction::Stand => self.finish_active_hand(),
            BlackjackAction::Double => {
                if !self.can_double() {
                    return Err(WagerError::InvalidAction("double is only allowed on the first two cards".to_string()));
                }
                let card = self.draw()?;
                self.doubled = true;
                self.player_hand.push(card);
                self.finish_active_hand();
            }
            BlackjackAction::Split => {
                if !self.can_split() {
                    return Err(WagerError::InvalidAction("split needs a pair on the first two cards".to_string()));
                }
                let second = self.player_hand.pop().ok_or_else(|| {
                    WagerError::InvalidAction("nothing to split".to_string())
                })?;
                let main_card = self.draw()?;
                let split_card = self.draw()?;
                self.player_hand.push(main_card);
                self.split_hand = Some(vec![second, split_card]);
            }
        }
        Ok(())
    }

    fn finish_active_hand(&mut self) {
        if self.active_hand == HandSlot::Main && self.split_hand.is_some() {
            self.active_hand = HandSlot::Split;
            let split_done = self.split_hand.as_deref().is_some_and(|hand| hand_value(hand).0 >= 21);
            if !split_done {
                return;
            }
        }
        self.play_dealer();
    }

    fn play_dealer(&mut self) {
        self.phase = BlackjackPhase::DealerTurn;
        self.reveal_hole_card();

        let any_live = !is_bust(&self.player_hand)
            || self.split_hand.as_deref().is_some_and(|hand| !is_bust(hand));
        if any_live {
            while hand_value(&self.dealer_hand).0 < 17 {
                match self.deck.pop() {
                    Some(card) => self.dealer_hand.push(card),
                    None => break,
                }
            }
        }
        self.phase = BlackjackPhase::Finished;
    }

    /// Payout for a finished round given the main and split stakes
    pub fn settle(&self, bet: i64, split_bet: i64) -> RoundOutcome {
        let main_stake = if self.doubled { bet.saturating_mul(2) } else { bet };
        let natural_allowed = self.split_hand.is_none();

        let (main_payout, result) = self.settle_hand(&self.player_hand, main_stake, natural_allowed);
        let split_payout = self
            .split_hand
            .as_deref()
            .map_or(0, |hand| self.settle_hand(hand, split_bet, false).0);

        RoundOutcome {
            payout: main_payout.saturating_add(split_payout),
            result,
        }
    }

    fn settle_hand(&self, hand: &[Card], stake: i64, natural_allowed: bool) -> (i64, GameResultKind) {
        let (player, _) = hand_value(hand);
        let (dealer, _) = hand_value(&self.dealer_hand);
        let player_bj = natural_allowed && is_blackjack(hand);
        let dealer_bj = is_blackjack(&self.dealer_hand);

        if player > 21 {
            (0, GameResultKind::Lose)
        } else if player_bj && dealer_bj {
            (stake, GameResultKind::Push)
        } else if player_bj {
            (stake.saturating_mul(5) / 2, GameResultKind::Blackjack)
        } else if dealer_bj {
            (0, GameResultKind::Lose)
        } else if dealer > 21 || player > dealer {
            (stake.saturating_mul(2), GameResultKind::Win)
        } else if player == dealer {
            (stake, GameResultKind::Push)
        } else {
            (0, GameResultKind::Lose)
        }
    }
}
