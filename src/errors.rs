//! Error types for the points platform
//!
//! One root error with a sub-enum per concern, mirroring how callers recover:
//! wager rejections go back to the player, storage failures are retried by the
//! next cleanup tick, conflicts mean another writer settled the game first.

use thiserror::Error;
use uuid::Uuid;

/// Root error type for all pointvault operations
#[derive(Debug, Error)]
pub enum RewardsError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Wager rejected: {0}")]
    Wager(#[from] WagerError),

    /// A conditional game transition found the game no longer active
    #[error("Game {game_id} is no longer active")]
    Conflict { game_id: Uuid },

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Storage call timed out after {0} ms")]
    Timeout(u64),
}

/// Balance mutation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance: have {balance}, delta {delta}")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("Balance overflow applying {delta} to {balance}")]
    Overflow { balance: i64, delta: i64 },

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Ledger chain broken at seq {seq}: {reason}")]
    ChainBroken { seq: u64, reason: String },
}

/// Wager validation failures, surfaced to the player with a reason code
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WagerError {
    #[error("Game is disabled")]
    GameDisabled,

    #[error("No bets placed")]
    NoBets,

    #[error("Too many bets: {count} (max {max})")]
    TooManyBets { count: usize, max: usize },

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Bet of {amount} is below the minimum of {min}")]
    MinBetNotMet { amount: i64, min: i64 },

    #[error("Total stake {total} exceeds the maximum of {max}")]
    MaxBetExceeded { total: i64, max: i64 },

    #[error("Insufficient balance: stake {stake}, balance {balance}")]
    InsufficientBalance { stake: i64, balance: i64 },

    #[error("A {0} game is already in progress")]
    GameInProgress(String),

    #[error("Action not allowed: {0}")]
    InvalidAction(String),
}

impl WagerError {
    /// Stable reason code returned to game clients
    pub fn code(&self) -> &'static str {
        match self {
            WagerError::GameDisabled => "GAME_DISABLED",
            WagerError::NoBets => "NO_BETS",
            WagerError::TooManyBets { .. } => "TOO_MANY_BETS",
            WagerError::InvalidBet(_) => "INVALID_BET",
            WagerError::MinBetNotMet { .. } => "MIN_BET_NOT_MET",
            WagerError::MaxBetExceeded { .. } => "MAX_BET_EXCEEDED",
            WagerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WagerError::GameInProgress(_) => "GAME_IN_PROGRESS",
            WagerError::InvalidAction(_) => "INVALID_ACTION",
        }
    }
}

impl From<rocksdb::Error> for RewardsError {
    fn from(e: rocksdb::Error) -> Self {
        RewardsError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for RewardsError {
    fn from(e: serde_json::Error) -> Self {
        RewardsError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<std::io::Error> for RewardsError {
    fn from(e: std::io::Error) -> Self {
        RewardsError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

/// Convenience type alias for Results
pub type RewardsResult<T> = Result<T, RewardsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err: RewardsError = ConfigurationError::ValidationFailed("test".to_string()).into();
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn test_wager_codes() {
        assert_eq!(WagerError::GameDisabled.code(), "GAME_DISABLED");
        assert_eq!(
            WagerError::MinBetNotMet { amount: 1, min: 10 }.code(),
            "MIN_BET_NOT_MET"
        );
        assert_eq!(
            WagerError::MaxBetExceeded { total: 11, max: 10 }.code(),
            "MAX_BET_EXCEEDED"
        );
        assert_eq!(
            WagerError::InsufficientBalance { stake: 5, balance: 1 }.code(),
            "INSUFFICIENT_BALANCE"
        );
    }

    #[test]
    fn test_error_source() {
        let err: RewardsError = StorageError::ReadFailed("disk".to_string()).into();
        assert!(err.source().is_some());
    }
}
