//! Player-facing intents over a [`ColonyStore`].
//!
//! Each intent loads the colony, applies the engine to a copy and saves it
//! with compare-and-swap. A conflicting save is retried once from freshly
//! loaded state before [`EngineError::PersistenceConflict`] is surfaced, so a
//! deduction and the construction it pays for are never persisted apart.

use crate::construction::{ConstructionEngine, ConstructionStarted, UpgradeRequest};
use crate::error::{EngineError, StoreError};
use crate::fleet::ShipsBuilt;
use crate::research::TechUnlocked;
use crate::snapshot::Snapshot;
use crate::state::ColonyState;
use crate::store::ColonyStore;
use chrono::{DateTime, Utc};
use colony_core::{
    BuildingTypeId, PlayerBuildingId, PlayerId, ResourceBundle, ShipTypeId, TechTypeId,
};
use tracing::{debug, warn};

const SAVE_ATTEMPTS: usize = 2;

pub struct Colony<S> {
    engine: ConstructionEngine,
    store: S,
}

impl<S: ColonyStore> Colony<S> {
    pub fn new(engine: ConstructionEngine, store: S) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &ConstructionEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the colony on first access; returns the existing one otherwise.
    pub async fn initialize(
        &self,
        player: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, EngineError> {
        if let Some(state) = self.store.load(player).await? {
            return self.engine.snapshot(&state, now);
        }
        let mut state = self.engine.new_colony(player.clone(), now)?;
        match self.store.save(&state).await {
            Ok(version) => {
                state.version = version;
                self.engine.snapshot(&state, now)
            }
            // Someone else founded it first.
            Err(StoreError::Conflict { .. }) => match self.store.load(player).await? {
                Some(existing) => self.engine.snapshot(&existing, now),
                None => Err(EngineError::PersistenceConflict(player.clone())),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Advance the colony to `now`, persist any change and describe it.
    pub async fn refresh(
        &self,
        player: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, EngineError> {
        let (mut snapshot, version) = self
            .transact_versioned(player, |engine, state| {
                engine.advance(state, now)?;
                engine.snapshot(state, now)
            })
            .await?;
        snapshot.version = version;
        Ok(snapshot)
    }

    pub async fn balances(
        &self,
        player: &PlayerId,
        now: DateTime<Utc>,
    ) -> Result<ResourceBundle, EngineError> {
        Ok(self.refresh(player, now).await?.balances)
    }

    pub async fn build(
        &self,
        player: &PlayerId,
        building_type_id: BuildingTypeId,
        now: DateTime<Utc>,
    ) -> Result<ConstructionStarted, EngineError> {
        self.transact(player, |engine, state| {
            engine.start_construction(state, building_type_id, now)
        })
        .await
    }

    pub async fn upgrade(
        &self,
        player: &PlayerId,
        building_id: PlayerBuildingId,
        now: DateTime<Utc>,
    ) -> Result<ConstructionStarted, EngineError> {
        self.transact(player, |engine, state| {
            engine.upgrade(state, building_id, now)
        })
        .await
    }

    pub async fn enqueue_upgrade(
        &self,
        player: &PlayerId,
        building_id: PlayerBuildingId,
        now: DateTime<Utc>,
    ) -> Result<UpgradeRequest, EngineError> {
        self.transact(player, |engine, state| {
            engine.enqueue_upgrade(state, building_id, now)
        })
        .await
    }

    pub async fn build_ships(
        &self,
        player: &PlayerId,
        ship_type_id: ShipTypeId,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Result<ShipsBuilt, EngineError> {
        self.transact(player, |engine, state| {
            engine.build_ships(state, ship_type_id, quantity, now)
        })
        .await
    }

    pub async fn research(
        &self,
        player: &PlayerId,
        tech_type_id: TechTypeId,
        now: DateTime<Utc>,
    ) -> Result<TechUnlocked, EngineError> {
        self.transact(player, |engine, state| {
            engine.research(state, tech_type_id, now)
        })
        .await
    }

    async fn transact<T>(
        &self,
        player: &PlayerId,
        f: impl Fn(&ConstructionEngine, &mut ColonyState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        Ok(self.transact_versioned(player, f).await?.0)
    }

    /// Load, apply `f` and save; returns `f`'s output and the saved version.
    async fn transact_versioned<T>(
        &self,
        player: &PlayerId,
        f: impl Fn(&ConstructionEngine, &mut ColonyState) -> Result<T, EngineError>,
    ) -> Result<(T, u64), EngineError> {
        for attempt in 1..=SAVE_ATTEMPTS {
            let mut state = self
                .store
                .load(player)
                .await?
                .ok_or_else(|| EngineError::not_found("colony", player))?;
            let out = f(&self.engine, &mut state)?;
            match self.store.save(&state).await {
                Ok(version) => {
                    debug!(%player, version, attempt, "colony saved");
                    return Ok((out, version));
                }
                Err(StoreError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    warn!(%player, attempt, "colony changed underneath, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::PersistenceConflict(player.clone()))
    }
}
