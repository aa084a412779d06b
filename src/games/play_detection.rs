//! Did the player act on this game since it was created?
//!
//! A game the player never touched is refundable when it goes stale; one they
//! started playing is forced to a loss. Snapshots imported from the previous
//! system are untyped JSON and are read fail-closed: anything that cannot be
//! parsed counts as not played.

use super::types::{GameKind, GameState};
use serde_json::Value;

pub fn has_played(state: &GameState) -> bool {
    match state {
        GameState::Blackjack(bj) => {
            let player_drew = bj.player_hand.len() > 2;
            let dealer_revealed = bj.dealer_hand.len() > 1
                && bj.dealer_hand.iter().any(|card| card.hidden == Some(false));
            let split = bj.split_hand.as_ref().is_some_and(|hand| !hand.is_empty());
            player_drew || dealer_revealed || split
        }
        GameState::Mines(mines) => mines.revealed_count() > 0,
        GameState::Roulette(_) => true,
    }
}

pub fn has_played_legacy(kind: GameKind, json: Option<&str>) -> bool {
    let Some(raw) = json else {
        return false;
    };
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(%kind, error = %e, "unparsable legacy game state, treating as not played");
            return false;
        }
    };

    match kind {
        GameKind::Blackjack => legacy_blackjack_played(&value),
        GameKind::Mines => legacy_revealed_count(&value) > 0,
        GameKind::Roulette => true,
    }
}

fn legacy_blackjack_played(value: &Value) -> bool {
    let array_len = |key: &str| value.get(key).and_then(Value::as_array).map_or(0, Vec::len);

    if array_len("playerHand") > 2 {
        return true;
    }

    let dealer_revealed = value
        .get("dealerHand")
        .and_then(Value::as_array)
        .is_some_and(|cards| {
            cards.len() > 1
                && cards
                    .iter()
                    .any(|card| card.get("hidden").and_then(Value::as_bool) == Some(false))
        });
    if dealer_revealed {
        return true;
    }

    array_len("splitHand") > 0
}

/// `revealedCount` wins when present; otherwise count the `revealed` array,
/// which older snapshots store either as cell indices or as a boolean grid.
fn legacy_revealed_count(value: &Value) -> u64 {
    if let Some(count) = value.get("revealedCount").and_then(Value::as_u64) {
        return count;
    }
    value
        .get("revealed")
        .and_then(Value::as_array)
        .map_or(0, |cells| {
            cells
                .iter()
                .filter(|cell| match cell {
                    Value::Bool(b) => *b,
                    Value::Number(_) => true,
                    _ => false,
                })
                .count() as u64
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::blackjack::{BlackjackState, Card, Suit};
    use crate::games::mines::MinesState;

    fn card(rank: u8) -> Card {
        Card::new(rank, Suit::Spades)
    }

    fn hole(rank: u8, hidden: bool) -> Card {
        Card {
            hidden: Some(hidden),
            ..card(rank)
        }
    }

    fn fresh_blackjack() -> BlackjackState {
        BlackjackState::dealt(vec![card(10), card(6)], vec![card(9), hole(7, true)], Vec::new())
    }

    #[test]
    fn untouched_blackjack_is_not_played() {
        assert!(!has_played(&GameState::Blackjack(fresh_blackjack())));
    }

    #[test]
    fn third_player_card_counts_as_play() {
        let mut bj = fresh_blackjack();
        bj.player_hand.push(card(2));
        assert!(has_played(&GameState::Blackjack(bj)));
    }

    #[test]
    fn revealed_hole_card_counts_as_play() {
        let mut bj = fresh_blackjack();
        bj.dealer_hand[1].hidden = Some(false);
        assert!(has_played(&GameState::Blackjack(bj)));
    }

    #[test]
    fn dealer_cards_without_flag_do_not_count() {
        let mut bj = fresh_blackjack();
        bj.dealer_hand[1].hidden = None;
        assert!(!has_played(&GameState::Blackjack(bj)));
    }

    #[test]
    fn split_hand_counts_as_play() {
        let mut bj = fresh_blackjack();
        bj.split_hand = Some(vec![card(6)]);
        assert!(has_played(&GameState::Blackjack(bj)));
    }

    #[test]
    fn mines_played_after_first_reveal() {
        let mut mines = MinesState::new(3, vec![0, 1, 2]);
        assert!(!has_played(&GameState::Mines(mines.clone())));
        mines.revealed.push(7);
        assert!(has_played(&GameState::Mines(mines)));
    }

    #[test]
    fn legacy_fails_closed() {
        assert!(!has_played_legacy(GameKind::Blackjack, None));
        assert!(!has_played_legacy(GameKind::Blackjack, Some("{not json")));
        assert!(!has_played_legacy(GameKind::Mines, Some("[]")));
    }

    #[test]
    fn legacy_blackjack_rules() {
        let untouched = r#"{"playerHand":[{"rank":10},{"rank":6}],"dealerHand":[{"rank":9},{"rank":7,"hidden":true}]}"#;
        assert!(!has_played_legacy(GameKind::Blackjack, Some(untouched)));

        let hit = r#"{"playerHand":[{},{},{}],"dealerHand":[{}]}"#;
        assert!(has_played_legacy(GameKind::Blackjack, Some(hit)));

        let revealed = r#"{"playerHand":[{},{}],"dealerHand":[{"hidden":false},{"hidden":false}]}"#;
        assert!(has_played_legacy(GameKind::Blackjack, Some(revealed)));

        let split = r#"{"playerHand":[{},{}],"dealerHand":[{}],"splitHand":[{}]}"#;
        assert!(has_played_legacy(GameKind::Blackjack, Some(split)));
    }

    #[test]
    fn legacy_mines_rules() {
        assert!(has_played_legacy(GameKind::Mines, Some(r#"{"revealedCount":2}"#)));
        assert!(!has_played_legacy(GameKind::Mines, Some(r#"{"revealedCount":0}"#)));
        assert!(has_played_legacy(GameKind::Mines, Some(r#"{"revealed":[4]}"#)));
        assert!(!has_played_legacy(GameKind::Mines, Some(r#"{"revealed":[false,false]}"#)));
    }
}
