pub mod blackjack;
pub mod mines;
pub mod play_detection;
pub mod roulette;
pub mod service;
pub mod settlement;
pub mod types;

pub use service::{GameService, GameUpdate, SpinReceipt};
pub use settlement::SettlementDecision;
pub use types::*;
