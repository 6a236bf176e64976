#![deny(warnings)]

//! Colony runtime: resource ledger, construction state machine, upgrade
//! queue, fleet construction and research, plus the versioned persistence
//! contract and the async service that drives them.
//!
//! The engine holds no timers. Callers pull state with
//! [`Colony::refresh`] (or any intent), and elapsed construction is applied
//! lazily as part of that same write.

mod config;
mod construction;
mod error;
mod fleet;
mod ledger;
mod production;
mod research;
mod service;
mod snapshot;
mod state;
mod store;

#[cfg(test)]
mod fixtures;

pub use config::{ConcurrencyPolicy, EngineConfig, StorageConfig};
pub use construction::{
    ConstructionCompleted, ConstructionEngine, ConstructionStarted, TickReport, UpgradeRequest,
};
pub use error::{ConfigError, EngineError, ErrorKind, StoreError};
pub use fleet::ShipsBuilt;
pub use ledger::ResourceLedger;
pub use production::{summarize, ProductionSummary};
pub use research::TechUnlocked;
pub use service::Colony;
pub use snapshot::{BuildingView, QueueView, ShipView, Snapshot};
pub use state::{BuildingPhase, ColonyState, PlayerBuilding, PlayerShip, UpgradeQueueEntry};
pub use store::{ColonyStore, MemoryStore};
