use std::fmt;
use thiserror::Error;

/// A storage-level constraint that a write would have broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `balance_cents >= 0`
    NegativeBalance,
    /// `balance_after_cents = balance_before_cents + amount_cents`
    LedgerMath,
    /// `status = completed => result is not null`
    CompletedWithoutResult,
    /// At most one active session per account.
    ActiveSessionExists,
    /// A row with the same primary key already exists.
    DuplicateKey,
    /// The row references an account that does not exist.
    MissingAccount,
    /// The row being updated does not exist.
    MissingRow,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Constraint::NegativeBalance => "balance must not be negative",
            Constraint::LedgerMath => "ledger entry does not balance",
            Constraint::CompletedWithoutResult => "completed session has no result",
            Constraint::ActiveSessionExists => "account already has an active session",
            Constraint::DuplicateKey => "duplicate key",
            Constraint::MissingAccount => "referenced account does not exist",
            Constraint::MissingRow => "row does not exist",
        };
        f.write_str(name)
    }
}

/// Failures raised by a storage backend. None of these leave partial effects
/// behind: the enclosing transaction is rolled back when it is dropped.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("timed out waiting for a row lock")]
    LockTimeout,
    #[error("constraint violated: {0}")]
    Constraint(Constraint),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientFunds,
    InvalidBet,
    GameDisabled,
    UnknownGame,
    InvalidAmount,
    SessionAlreadyActive,
    SessionNotActive,
    NoActiveSession,
    NotFound,
    Unauthorized,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::InvalidBet => "INVALID_BET",
            ErrorKind::GameDisabled => "GAME_DISABLED",
            ErrorKind::UnknownGame => "UNKNOWN_GAME",
            ErrorKind::InvalidAmount => "INVALID_AMOUNT",
            ErrorKind::SessionAlreadyActive => "SESSION_ALREADY_ACTIVE",
            ErrorKind::SessionNotActive => "SESSION_NOT_ACTIVE",
            ErrorKind::NoActiveSession => "NO_ACTIVE_SESSION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the ledger surfaces to its callers.
///
/// Business-rule errors are deterministic: retrying with the same inputs fails
/// the same way. Only [`LedgerError::Storage`] is worth a bounded retry.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid bet: {0}")]
    InvalidBet(String),
    #[error("game is not currently available")]
    GameDisabled,
    #[error("unknown game")]
    UnknownGame,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("account already has an active session")]
    SessionAlreadyActive,
    #[error("session is not active")]
    SessionNotActive,
    #[error("no active session")]
    NoActiveSession,
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("storage unavailable, no changes were applied")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientFunds => ErrorKind::InsufficientFunds,
            LedgerError::InvalidBet(_) => ErrorKind::InvalidBet,
            LedgerError::GameDisabled => ErrorKind::GameDisabled,
            LedgerError::UnknownGame => ErrorKind::UnknownGame,
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::SessionAlreadyActive => ErrorKind::SessionAlreadyActive,
            LedgerError::SessionNotActive => ErrorKind::SessionNotActive,
            LedgerError::NoActiveSession => ErrorKind::NoActiveSession,
            LedgerError::NotFound => ErrorKind::NotFound,
            LedgerError::Unauthorized => ErrorKind::Unauthorized,
            LedgerError::Storage(_) => ErrorKind::StorageError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while driving the ledger from a command script.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown player {0}")]
    UnknownPlayer(u32),
    #[error("player {0} is already registered")]
    DuplicatePlayer(u32),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("[{kind}] {0}", kind = .0.kind())]
    Ledger(#[from] LedgerError),
}
