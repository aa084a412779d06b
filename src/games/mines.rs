//! Mines on a 5x5 grid.
//!
//! Each safe reveal raises the cash-out multiplier by the inverse odds of
//! having survived it, less the house edge.

use crate::errors::WagerError;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const GRID_SIZE: u8 = 25;
pub const MIN_MINES: u8 = 1;
pub const MAX_MINES: u8 = 24;
pub const HOUSE_EDGE: f64 = 0.97;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MinesState {
    pub mine_count: u8,
    /// Mine cells, 0..25
    pub mines: Vec<u8>,
    /// Safe cells revealed so far, in reveal order
    #[serde(default)]
    pub revealed: Vec<u8>,
    /// Mine cell that ended the round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploded: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Mine,
    Safe { board_cleared: bool },
}

impl MinesState {
    pub fn new(mine_count: u8, mines: Vec<u8>) -> Self {
        Self {
            mine_count,
            mines,
            revealed: Vec::new(),
            exploded: None,
        }
    }

    /// Place `mine_count` mines uniformly on an empty board
    pub fn place<R: Rng + ?Sized>(rng: &mut R, mine_count: u8) -> Result<Self, WagerError> {
        if !(MIN_MINES..=MAX_MINES).contains(&mine_count) {
            return Err(WagerError::InvalidBet(format!(
                "mine count must be between {} and {}, got {}",
                MIN_MINES, MAX_MINES, mine_count
            )));
        }
        let mut mines: Vec<u8> = index::sample(rng, GRID_SIZE as usize, mine_count as usize)
            .into_iter()
            .map(|cell| cell as u8)
            .collect();
        mines.sort_unstable();
        Ok(Self::new(mine_count, mines))
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed.len()
    }

    pub fn safe_cells(&self) -> usize {
        GRID_SIZE as usize - self.mine_count as usize
    }

    pub fn reveal(&mut self, cell: u8) -> Result<RevealOutcome, WagerError> {
        if self.exploded.is_some() {
            return Err(WagerError::InvalidAction("round already lost".to_string()));
        }
        if cell >= GRID_SIZE {
            return Err(WagerError::InvalidAction(format!("cell {} is off the board", cell)));
        }
        if self.revealed.contains(&cell) {
            return Err(WagerError::InvalidAction(format!("cell {} is already revealed", cell)));
        }

        if self.mines.contains(&cell) {
            self.exploded = Some(cell);
            return Ok(RevealOutcome::Mine);
        }

        self.revealed.push(cell);
        Ok(RevealOutcome::Safe {
            board_cleared: self.revealed_count() >= self.safe_cells(),
        })
    }

    pub fn multiplier(&self) -> f64 {
        multiplier(self.mine_count, self.revealed_count())
    }

    /// Points returned on cash-out, stake included
    pub fn cash_out_payout(&self, bet: i64) -> Result<i64, WagerError> {
        if self.revealed.is_empty() {
            return Err(WagerError::InvalidAction("reveal at least one cell before cashing out".to_string()));
        }
        Ok((bet as f64 * self.multiplier()).floor() as i64)
    }
}

/// `0.97 * prod (25 - i) / (25 - mines - i)` over the revealed cells
pub fn multiplier(mine_count: u8, revealed: usize) -> f64 {
    let total = GRID_SIZE as f64;
    let safe = total - mine_count as f64;
    let odds: f64 = (0..revealed)
        .map(|i| (total - i as f64) / (safe - i as f64))
        .product();
    HOUSE_EDGE * odds
}
