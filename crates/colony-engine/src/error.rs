use colony_core::{PlayerId, ResourceBundle};
use colony_econ::EconError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures surfaced to the presentation layer. `Display` is the reason string.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("requires {building} at level {required} (current level {current})")]
    PrerequisiteNotMet {
        building: String,
        required: u32,
        current: u32,
    },
    #[error("insufficient resources: missing {shortfall}")]
    InsufficientResources { shortfall: ResourceBundle },
    #[error("{building} is already at max level {max_level}")]
    AlreadyAtMaxLevel { building: String, max_level: u32 },
    #[error("construction already in progress: {building}")]
    AlreadyUnderConstruction { building: String },
    #[error("{0} is already unlocked")]
    AlreadyUnlocked(String),
    #[error("upgrade queue is full ({0} pending)")]
    QueueFull(usize),
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("colony of {0} was modified concurrently, try again")]
    PersistenceConflict(PlayerId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error(transparent)]
    Econ(#[from] EconError),
}

/// Flat classification of [`EngineError`] for callers that branch on kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PrerequisiteNotMet,
    InsufficientResources,
    AlreadyAtMaxLevel,
    AlreadyUnderConstruction,
    AlreadyUnlocked,
    QueueFull,
    InvalidQuantity,
    PersistenceConflict,
    Persistence,
    Arithmetic,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::PrerequisiteNotMet { .. } => ErrorKind::PrerequisiteNotMet,
            EngineError::InsufficientResources { .. } => ErrorKind::InsufficientResources,
            EngineError::AlreadyAtMaxLevel { .. } => ErrorKind::AlreadyAtMaxLevel,
            EngineError::AlreadyUnderConstruction { .. } => ErrorKind::AlreadyUnderConstruction,
            EngineError::AlreadyUnlocked(_) => ErrorKind::AlreadyUnlocked,
            EngineError::QueueFull(_) => ErrorKind::QueueFull,
            EngineError::InvalidQuantity => ErrorKind::InvalidQuantity,
            EngineError::PersistenceConflict(_) => ErrorKind::PersistenceConflict,
            EngineError::Persistence(_) => ErrorKind::Persistence,
            EngineError::Econ(_) => ErrorKind::Arithmetic,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}

/// Errors raised by a [`crate::ColonyStore`] implementation.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// The stored version no longer matches the version the caller read.
    #[error("version conflict for {player}: expected {expected}")]
    Conflict { player: PlayerId, expected: u64 },
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { player, .. } => EngineError::PersistenceConflict(player),
            StoreError::Backend(msg) => EngineError::Persistence(msg),
        }
    }
}

/// Errors raised while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    /// Exponential costs must grow with every level.
    #[error("cost growth factor must be greater than 1, got {0}")]
    CostFactor(Decimal),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}
