//! PointVault - points ledger, casino mini-games and stale game cleanup
//!
//! Players hold a point balance backed by an append-only ledger. Roulette,
//! blackjack and mines wagers debit and credit that balance atomically with
//! the game row they belong to. A background scanner settles session games
//! abandoned mid-round: untouched rounds are refunded, played rounds are
//! closed as losses.

pub mod api;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod store;

pub use cleanup::{CleanupReport, CleanupScheduler, ScannerConfig, StaleGameScanner};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigLoader, RewardsConfig};
pub use errors::{RewardsError, RewardsResult};
pub use games::{GameKind, GameRecord, GameService, GameSettings, GameState, GameStatus};
pub use ledger::{PointHistory, PointType, UserAccount, UserId};
pub use metrics::MetricsRegistry;
pub use store::{ChangeSet, MemoryStore, PointsStore, RocksStore};
