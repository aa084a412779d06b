//! European roulette: multi-bet spins settled in one step.
//!
//! Dozens and columns are numbered 1..=3 on the wire. Zero loses every bet
//! except a straight-up bet on 0.

use super::types::GameSettings;
use crate::errors::WagerError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum number of bets per spin
pub const MAX_BETS: usize = 20;

/// Red numbers on a roulette wheel
pub const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetKind {
    Number,
    Red,
    Black,
    Even,
    Odd,
    Low,
    High,
    Dozen,
    Column,
}

impl BetKind {
    /// Payout multiplier, excluding the returned stake
    pub fn odds(&self) -> i64 {
        match self {
            BetKind::Number => 35,
            BetKind::Red | BetKind::Black | BetKind::Even | BetKind::Odd | BetKind::Low | BetKind::High => 1,
            BetKind::Dozen | BetKind::Column => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouletteBet {
    #[serde(rename = "type")]
    pub kind: BetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u8>,
    pub amount: i64,
}

impl RouletteBet {
    pub fn new(kind: BetKind, value: Option<u8>, amount: i64) -> Self {
        Self { kind, value, amount }
    }

    fn check_shape(&self) -> Result<(), WagerError> {
        if self.amount <= 0 {
            return Err(WagerError::InvalidBet(format!("amount must be positive, got {}", self.amount)));
        }
        match (self.kind, self.value) {
            (BetKind::Number, Some(n)) if n <= 36 => Ok(()),
            (BetKind::Dozen | BetKind::Column, Some(n)) if (1..=3).contains(&n) => Ok(()),
            (BetKind::Number | BetKind::Dozen | BetKind::Column, value) => Err(WagerError::InvalidBet(
                format!("{:?} bet has invalid value {:?}", self.kind, value),
            )),
            (_, None) => Ok(()),
            (kind, Some(_)) => Err(WagerError::InvalidBet(format!("{:?} bet takes no value", kind))),
        }
    }

    pub fn wins(&self, result: u8) -> bool {
        if result == 0 {
            return self.kind == BetKind::Number && self.value == Some(0);
        }

        let value = self.value.unwrap_or(0);
        match self.kind {
            BetKind::Number => value == result,
            BetKind::Red => is_red(result),
            BetKind::Black => !is_red(result),
            BetKind::Even => result % 2 == 0,
            BetKind::Odd => result % 2 == 1,
            BetKind::Low => (1..=18).contains(&result),
            BetKind::High => (19..=36).contains(&result),
            BetKind::Dozen => (result - 1) / 12 + 1 == value,
            BetKind::Column => (result - 1) % 3 + 1 == value,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

fn is_red(number: u8) -> bool {
    RED_NUMBERS.contains(&number)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinOutcome {
    pub number: u8,
    pub color: Color,
}

impl SpinOutcome {
    pub fn from_number(number: u8) -> Self {
        let color = if number == 0 {
            Color::Green
        } else if is_red(number) {
            Color::Red
        } else {
            Color::Black
        };
        Self { number, color }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetResult {
    pub bet: RouletteBet,
    pub won: bool,
    /// Stake plus winnings for a won bet, 0 otherwise
    pub payout: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinSettlement {
    pub total_stake: i64,
    pub total_win: i64,
    pub net_change: i64,
    pub per_bet: Vec<BetResult>,
}

/// Snapshot kept on the completed game record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouletteState {
    pub bets: Vec<RouletteBet>,
    pub outcome: SpinOutcome,
}

/// Check a bet slip against the table limits and the player's balance.
///
/// Returns the aggregate stake.
pub fn validate_bets(bets: &[RouletteBet], settings: &GameSettings, balance: i64) -> Result<i64, WagerError> {
    if !settings.enabled {
        return Err(WagerError::GameDisabled);
    }
    if bets.is_empty() {
        return Err(WagerError::NoBets);
    }
    if bets.len() > MAX_BETS {
        return Err(WagerError::TooManyBets {
            count: bets.len(),
            max: MAX_BETS,
        });
    }

    let mut total: i64 = 0;
    for bet in bets {
        bet.check_shape()?;
        if bet.amount < settings.min_bet {
            return Err(WagerError::MinBetNotMet {
                amount: bet.amount,
                min: settings.min_bet,
            });
        }
        total = total
            .checked_add(bet.amount)
            .ok_or_else(|| WagerError::InvalidBet("total stake overflows".to_string()))?;
    }

    if total > settings.max_bet {
        return Err(WagerError::MaxBetExceeded {
            total,
            max: settings.max_bet,
        });
    }
    if total > balance {
        return Err(WagerError::InsufficientBalance { stake: total, balance });
    }
    Ok(total)
}

/// Uniform draw over the 37 pockets
pub fn resolve_outcome<R: Rng + ?Sized>(rng: &mut R) -> SpinOutcome {
    SpinOutcome::from_number(rng.gen_range(0..=36))
}

pub fn settle(bets: &[RouletteBet], outcome: SpinOutcome) -> SpinSettlement {
    let mut total_stake = 0i64;
    let mut total_win = 0i64;
    let per_bet = bets
        .iter()
        .map(|bet| {
            total_stake = total_stake.saturating_add(bet.amount);
            let won = bet.wins(outcome.number);
            let payout = if won {
                bet.amount.saturating_add(bet.amount.saturating_mul(bet.kind.odds()))
            } else {
                0
            };
            total_win = total_win.saturating_add(payout);
            BetResult {
                bet: bet.clone(),
                won,
                payout,
            }
        })
        .collect();

    SpinSettlement {
        total_stake,
        total_win,
        net_change: total_win - total_stake,
        per_bet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings() -> GameSettings {
        GameSettings {
            enabled: true,
            min_bet: 10,
            max_bet: 1_000,
        }
    }

    #[test]
    fn straight_up_pays_thirty_five_to_one() {
        let bets = vec![RouletteBet::new(BetKind::Number, Some(17), 100)];
        let settlement = settle(&bets, SpinOutcome::from_number(17));
        assert_eq!(settlement.total_win, 3_600);
        assert_eq!(settlement.net_change, 3_500);
    }

    #[test]
    fn red_pays_even_money() {
        let bets = vec![RouletteBet::new(BetKind::Red, None, 100)];
        let settlement = settle(&bets, SpinOutcome::from_number(1));
        assert_eq!(settlement.total_win, 200);
        assert_eq!(settlement.net_change, 100);
    }

    #[test]
    fn zero_loses_outside_bets() {
        let bets = vec![
            RouletteBet::new(BetKind::Red, None, 50),
            RouletteBet::new(BetKind::Black, None, 50),
            RouletteBet::new(BetKind::Even, None, 50),
            RouletteBet::new(BetKind::Dozen, Some(1), 50),
        ];
        let settlement = settle(&bets, SpinOutcome::from_number(0));
        assert_eq!(settlement.total_win, 0);
        assert_eq!(settlement.net_change, -200);

        let zero = vec![RouletteBet::new(BetKind::Number, Some(0), 10)];
        assert_eq!(settle(&zero, SpinOutcome::from_number(0)).total_win, 360);
    }

    #[test]
    fn dozens_and_columns_are_one_based() {
        let dozen = RouletteBet::new(BetKind::Dozen, Some(3), 10);
        assert!(dozen.wins(25));
        assert!(!dozen.wins(24));

        let column = RouletteBet::new(BetKind::Column, Some(1), 10);
        assert!(column.wins(34));
        assert!(!column.wins(36));
        assert_eq!(settle(&[column], SpinOutcome::from_number(1)).total_win, 30);
    }

    #[test]
    fn validation_codes() {
        let s = settings();
        assert_eq!(validate_bets(&[], &s, 100).unwrap_err().code(), "NO_BETS");

        let small = [RouletteBet::new(BetKind::Odd, None, 5)];
        assert_eq!(validate_bets(&small, &s, 100).unwrap_err().code(), "MIN_BET_NOT_MET");

        let big = [
            RouletteBet::new(BetKind::Odd, None, 600),
            RouletteBet::new(BetKind::Even, None, 600),
        ];
        assert_eq!(validate_bets(&big, &s, 10_000).unwrap_err().code(), "MAX_BET_EXCEEDED");

        let ok = [RouletteBet::new(BetKind::Low, None, 50)];
        assert_eq!(validate_bets(&ok, &s, 49).unwrap_err().code(), "INSUFFICIENT_BALANCE");
        assert_eq!(validate_bets(&ok, &s, 50), Ok(50));

        let bad = [RouletteBet::new(BetKind::Number, Some(37), 50)];
        assert_eq!(validate_bets(&bad, &s, 100).unwrap_err().code(), "INVALID_BET");

        let disabled = GameSettings { enabled: false, ..s };
        assert_eq!(validate_bets(&ok, &disabled, 100).unwrap_err().code(), "GAME_DISABLED");
    }

    #[test]
    fn too_many_bets_rejected() {
        let bets: Vec<_> = (0..=MAX_BETS as u8)
            .map(|n| RouletteBet::new(BetKind::Number, Some(n), 10))
            .collect();
        let err = validate_bets(&bets, &settings(), 100_000).unwrap_err();
        assert!(matches!(err, WagerError::TooManyBets { count: 21, max: 20 }));
    }

    #[test]
    fn outcome_colours_follow_wheel() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let outcome = resolve_outcome(&mut rng);
            assert!(outcome.number <= 36);
            let expected = SpinOutcome::from_number(outcome.number).color;
            assert_eq!(outcome.color, expected);
        }
        assert_eq!(SpinOutcome::from_number(0).color, Color::Green);
        assert_eq!(SpinOutcome::from_number(2).color, Color::Black);
    }
}
