//! Building construction: validation, payment, timers and the upgrade queue.
//!
//! Completion is discovered, not pushed. Every intent first calls
//! [`ConstructionEngine::advance`], which walks the colony forward to `now`:
//! it accrues production up to each timer expiry, applies the level bump,
//! promotes queued upgrades and finally accrues the remainder of the window.
//! A building therefore produces at its old level until its timer elapses and
//! at the new level afterwards, no matter how rarely the colony is read.

use crate::config::{ConcurrencyPolicy, EngineConfig};
use crate::error::EngineError;
use crate::production::{summarize, ProductionSummary};
use crate::state::{ColonyState, UpgradeQueueEntry};
use chrono::{DateTime, TimeDelta, Utc};
use colony_core::{
    BuildingTypeDef, BuildingTypeId, Catalog, PlayerBuildingId, PlayerId, Prerequisite,
    ResourceBundle,
};
use colony_econ::{construction_duration_secs, upgrade_cost, EconError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A timer that was started and paid for.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConstructionStarted {
    pub building_id: PlayerBuildingId,
    pub building_type_id: BuildingTypeId,
    pub name: String,
    pub target_level: u32,
    pub cost: ResourceBundle,
    pub ends_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConstructionCompleted {
    pub building_id: PlayerBuildingId,
    pub name: String,
    pub level: u32,
    pub completed_at: DateTime<Utc>,
}

/// What a [`ConstructionEngine::tick`] changed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub completed: Vec<ConstructionCompleted>,
    pub started: Vec<ConstructionStarted>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.started.is_empty()
    }

    fn merge(&mut self, other: TickReport) {
        self.completed.extend(other.completed);
        self.started.extend(other.started);
    }
}

/// Outcome of [`ConstructionEngine::enqueue_upgrade`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpgradeRequest {
    Started(ConstructionStarted),
    Queued {
        building_id: PlayerBuildingId,
        target_level: u32,
        /// 1-based place in the queue.
        position: usize,
    },
}

/// Gatekeeper and state machine for building upgrades.
///
/// Public intents are atomic: they work on a copy of the colony and only
/// replace it on success, so a failed intent leaves balances, levels and
/// timers exactly as they were.
#[derive(Clone, Debug)]
pub struct ConstructionEngine {
    catalog: Arc<Catalog>,
    config: EngineConfig,
}

pub(crate) fn atomically<T>(
    state: &mut ColonyState,
    f: impl FnOnce(&mut ColonyState) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut next = state.clone();
    let out = f(&mut next)?;
    *state = next;
    Ok(out)
}

impl ConstructionEngine {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh colony holding the starter resources and starter buildings.
    pub fn new_colony(
        &self,
        player: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<ColonyState, EngineError> {
        let mut state = ColonyState::new(player, self.config.starter_resources.clone(), now);
        for starter in &self.config.starter_buildings {
            let def = self
                .catalog
                .building_by_name(&starter.building)
                .ok_or_else(|| EngineError::not_found("building type", &starter.building))?;
            let id = match state.building_of_type(def.id) {
                Some(b) => b.id,
                None => state.insert_building(def.id),
            };
            if let Some(b) = state.building_mut(id) {
                b.level = starter.level.min(def.max_level);
            }
        }
        info!(player = %state.player_id, "colony founded");
        Ok(state)
    }

    /// Production figures at the buildings' completed levels.
    pub fn production(&self, state: &ColonyState) -> Result<ProductionSummary, EconError> {
        summarize(&self.catalog, &state.buildings)
    }

    /// Bring the colony forward to `now`: accrue, complete and promote.
    pub fn advance(
        &self,
        state: &mut ColonyState,
        now: DateTime<Utc>,
    ) -> Result<TickReport, EngineError> {
        atomically(state, |s| self.advance_in_place(s, now))
    }

    pub(crate) fn advance_in_place(
        &self,
        state: &mut ColonyState,
        now: DateTime<Utc>,
    ) -> Result<TickReport, EngineError> {
        let mut report = TickReport::default();
        while let Some(at) = state.next_completion().filter(|at| *at <= now) {
            self.accrue(state, at)?;
            report.merge(self.tick(state, at));
        }
        self.accrue(state, now)?;
        report.merge(self.tick(state, now));
        Ok(report)
    }

    fn accrue(&self, state: &mut ColonyState, until: DateTime<Utc>) -> Result<(), EconError> {
        let summary = self.production(state)?;
        let caps = summary.caps(&self.config.storage);
        state.ledger.accrue(&summary.rates, caps.as_ref(), until)?;
        Ok(())
    }

    /// Complete every timer expired at `now`, then start queued upgrades.
    ///
    /// Does not accrue production; [`ConstructionEngine::advance`] does both
    /// in the right order.
    pub fn tick(&self, state: &mut ColonyState, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let player = state.player_id.clone();
        for b in state.buildings.iter_mut() {
            let Some(ends_at) = b.construction_ends_at else {
                continue;
            };
            if ends_at > now {
                continue;
            }
            b.level += 1;
            b.construction_ends_at = None;
            let name = self.type_name(b.building_type_id);
            info!(player = %player, building = %name, level = b.level, "construction completed");
            report.completed.push(ConstructionCompleted {
                building_id: b.id,
                name,
                level: b.level,
                completed_at: ends_at,
            });
        }
        self.promote_queue(state, now, &mut report);
        report
    }

    /// Start pending upgrades in request order while the policy allows.
    ///
    /// A head entry that cannot be paid for stays in place and blocks the
    /// entries behind it. Entries that can never start are dropped.
    fn promote_queue(&self, state: &mut ColonyState, now: DateTime<Utc>, report: &mut TickReport) {
        let mut i = 0;
        while i < state.queue.len() {
            let building_id = state.queue[i].building_id;
            let Some((def, level, busy)) = state.building(building_id).and_then(|b| {
                self.catalog
                    .building(b.building_type_id)
                    .map(|def| (def, b.level, b.is_upgrading()))
            }) else {
                warn!(player = %state.player_id, %building_id, "dropping queued upgrade for unknown building");
                state.queue.remove(i);
                continue;
            };
            if level >= def.max_level {
                warn!(player = %state.player_id, building = %def.name, "dropping queued upgrade past max level");
                state.queue.remove(i);
                continue;
            }
            if busy {
                i += 1;
                continue;
            }
            if self.config.concurrency == ConcurrencyPolicy::OnePerPlayer
                && state.upgrading().next().is_some()
            {
                break;
            }
            match self.begin(state, def, Some(building_id), now) {
                Ok(started) => {
                    state.queue.remove(i);
                    report.started.push(started);
                }
                Err(EngineError::InsufficientResources { shortfall }) => {
                    warn!(player = %state.player_id, building = %def.name, missing = %shortfall, "queued upgrade waiting for resources");
                    break;
                }
                Err(e) => {
                    warn!(player = %state.player_id, building = %def.name, error = %e, "dropping queued upgrade");
                    state.queue.remove(i);
                }
            }
        }
    }

    /// Build the first level of `building_type_id`, or upgrade it if owned.
    pub fn start_construction(
        &self,
        state: &mut ColonyState,
        building_type_id: BuildingTypeId,
        now: DateTime<Utc>,
    ) -> Result<ConstructionStarted, EngineError> {
        atomically(state, |s| {
            self.advance_in_place(s, now)?;
            let def = self
                .catalog
                .building(building_type_id)
                .ok_or_else(|| EngineError::not_found("building type", building_type_id))?;
            let existing = s.building_of_type(building_type_id).map(|b| b.id);
            self.begin(s, def, existing, now)
        })
    }

    /// Upgrade an owned building to its next level.
    pub fn upgrade(
        &self,
        state: &mut ColonyState,
        building_id: PlayerBuildingId,
        now: DateTime<Utc>,
    ) -> Result<ConstructionStarted, EngineError> {
        atomically(state, |s| {
            self.advance_in_place(s, now)?;
            let def = self.owned_def(s, building_id)?;
            self.begin(s, def, Some(building_id), now)
        })
    }

    /// Upgrade now if nothing blocks it, otherwise append to the queue.
    ///
    /// The queued target level accounts for a running upgrade and for
    /// earlier queued entries of the same building.
    pub fn enqueue_upgrade(
        &self,
        state: &mut ColonyState,
        building_id: PlayerBuildingId,
        now: DateTime<Utc>,
    ) -> Result<UpgradeRequest, EngineError> {
        atomically(state, |s| {
            self.advance_in_place(s, now)?;
            let def = self.owned_def(s, building_id)?;
            let Some(b) = s.building(building_id) else {
                return Err(EngineError::not_found("building", building_id));
            };
            let upgrading = b.is_upgrading();
            let level = b.level;
            let player_busy = self.config.concurrency == ConcurrencyPolicy::OnePerPlayer
                && s.upgrading().next().is_some();
            if !upgrading && !player_busy && s.queue.is_empty() {
                return self
                    .begin(s, def, Some(building_id), now)
                    .map(UpgradeRequest::Started);
            }

            let pending = u32::try_from(s.queued_for(building_id)).unwrap_or(u32::MAX);
            let target_level = level
                .saturating_add(u32::from(upgrading))
                .saturating_add(pending)
                .saturating_add(1);
            if target_level > def.max_level {
                return Err(EngineError::AlreadyAtMaxLevel {
                    building: def.name.clone(),
                    max_level: def.max_level,
                });
            }
            if s.queue.len() >= self.config.max_queue_depth {
                return Err(EngineError::QueueFull(s.queue.len()));
            }
            self.check_prerequisites(s, def)?;
            s.queue.push(UpgradeQueueEntry {
                building_id,
                target_level,
                requested_at: now,
            });
            let position = s.queue.len();
            info!(player = %s.player_id, building = %def.name, target_level, position, "upgrade queued");
            Ok(UpgradeRequest::Queued {
                building_id,
                target_level,
                position,
            })
        })
    }

    /// Number of pending upgrades that have not started yet.
    pub fn queue_depth(&self, state: &ColonyState) -> usize {
        state.queue.len()
    }

    /// Cost of the next level of `building_type_id` for this colony.
    pub fn upgrade_cost(
        &self,
        state: &ColonyState,
        building_type_id: BuildingTypeId,
    ) -> Result<ResourceBundle, EngineError> {
        let def = self
            .catalog
            .building(building_type_id)
            .ok_or_else(|| EngineError::not_found("building type", building_type_id))?;
        let level = state
            .building_of_type(building_type_id)
            .map(|b| b.level)
            .unwrap_or(0);
        self.next_cost(def, level)?
            .ok_or_else(|| EngineError::AlreadyAtMaxLevel {
                building: def.name.clone(),
                max_level: def.max_level,
            })
    }

    /// Amounts still missing to pay for the next level; empty when affordable.
    pub fn shortfall(
        &self,
        state: &ColonyState,
        building_type_id: BuildingTypeId,
    ) -> Result<ResourceBundle, EngineError> {
        let cost = self.upgrade_cost(state, building_type_id)?;
        Ok(state.ledger.balances().shortfall(&cost))
    }

    /// `None` once `level` has reached the type's maximum.
    pub(crate) fn next_cost(
        &self,
        def: &BuildingTypeDef,
        level: u32,
    ) -> Result<Option<ResourceBundle>, EconError> {
        if level >= def.max_level {
            return Ok(None);
        }
        upgrade_cost(&def.cost, level, &self.config.cost_formula).map(Some)
    }

    fn owned_def(
        &self,
        state: &ColonyState,
        building_id: PlayerBuildingId,
    ) -> Result<&BuildingTypeDef, EngineError> {
        let b = state
            .building(building_id)
            .ok_or_else(|| EngineError::not_found("building", building_id))?;
        self.catalog
            .building(b.building_type_id)
            .ok_or_else(|| EngineError::not_found("building type", b.building_type_id))
    }

    pub(crate) fn type_name(&self, id: BuildingTypeId) -> String {
        self.catalog
            .building(id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| format!("building type {id}"))
    }

    /// The founding structure (unless `def` is it) plus `def`'s own list.
    fn check_prerequisites(
        &self,
        state: &ColonyState,
        def: &BuildingTypeDef,
    ) -> Result<(), EngineError> {
        let founding = &self.config.founding_building;
        if def.name != *founding && self.catalog.building_by_name(founding).is_some() {
            self.check_requirements(
                state,
                std::slice::from_ref(&Prerequisite {
                    building: founding.clone(),
                    level: 1,
                }),
            )?;
        }
        self.check_requirements(state, &def.requirements)
    }

    pub(crate) fn check_requirements(
        &self,
        state: &ColonyState,
        requirements: &[Prerequisite],
    ) -> Result<(), EngineError> {
        for req in requirements {
            let current = state.level_by_name(&self.catalog, &req.building);
            if current < req.level {
                return Err(EngineError::PrerequisiteNotMet {
                    building: req.building.clone(),
                    required: req.level,
                    current,
                });
            }
        }
        Ok(())
    }

    /// Validate, pay and start the timer for the next level of `def`.
    ///
    /// `existing` is the owned instance, if any. Nothing is mutated unless
    /// every check passes.
    fn begin(
        &self,
        state: &mut ColonyState,
        def: &BuildingTypeDef,
        existing: Option<PlayerBuildingId>,
        now: DateTime<Utc>,
    ) -> Result<ConstructionStarted, EngineError> {
        let (level, upgrading) = existing
            .and_then(|id| state.building(id))
            .map(|b| (b.level, b.is_upgrading()))
            .unwrap_or((0, false));
        if upgrading {
            return Err(EngineError::AlreadyUnderConstruction {
                building: def.name.clone(),
            });
        }
        let Some(cost) = self.next_cost(def, level)? else {
            return Err(EngineError::AlreadyAtMaxLevel {
                building: def.name.clone(),
                max_level: def.max_level,
            });
        };
        self.check_prerequisites(state, def)?;
        if self.config.concurrency == ConcurrencyPolicy::OnePerPlayer {
            if let Some(busy) = state.upgrading().next() {
                return Err(EngineError::AlreadyUnderConstruction {
                    building: self.type_name(busy.building_type_id),
                });
            }
        }

        let target_level = level + 1;
        let secs = construction_duration_secs(def.construction_time_seconds, target_level);
        let ends_at = i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(EconError::Overflow("construction duration"))?;

        state.ledger.deduct(&cost)?;
        let building_id = match existing {
            Some(id) => id,
            None => state.insert_building(def.id),
        };
        if let Some(b) = state.building_mut(building_id) {
            b.construction_ends_at = Some(ends_at);
        }
        info!(
            player = %state.player_id,
            building = %def.name,
            target_level,
            cost = %cost,
            %ends_at,
            "construction started"
        );
        Ok(ConstructionStarted {
            building_id,
            building_type_id: def.id,
            name: def.name.clone(),
            target_level,
            cost,
            ends_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{after, engine, engine_with, player, t0};
    use crate::state::BuildingPhase;
    use colony_core::ResourceKind;
    use colony_econ::CostFormula;
    use rust_decimal::Decimal;
    use proptest::prelude::*;

    const SHELTER: BuildingTypeId = BuildingTypeId(1);
    const METAL_MINE: BuildingTypeId = BuildingTypeId(2);
    const CRYSTAL_MINE: BuildingTypeId = BuildingTypeId(3);
    const WAREHOUSE: BuildingTypeId = BuildingTypeId(6);

    fn balances(state: &ColonyState) -> (u64, u64, u64) {
        let l = &state.ledger;
        (
            l.balance(ResourceKind::Metal),
            l.balance(ResourceKind::Crystal),
            l.balance(ResourceKind::Food),
        )
    }

    fn shelter_id(state: &ColonyState) -> PlayerBuildingId {
        state.building_of_type(SHELTER).unwrap().id
    }

    #[test]
    fn new_colony_seeds_starters() {
        let state = engine().new_colony(player(), t0()).unwrap();
        assert_eq!(balances(&state), (500, 300, 200));
        assert_eq!(state.building_of_type(SHELTER).unwrap().level, 1);
        assert_eq!(state.version, 0);
    }

    #[test]
    fn first_metal_mine_pays_and_starts_timer() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let started = eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        assert_eq!(started.target_level, 1);
        assert_eq!(started.ends_at, after(60));
        assert_eq!(balances(&state), (400, 250, 200));
        let mine = state.building(started.building_id).unwrap();
        assert_eq!(mine.level, 0);
        assert_eq!(mine.construction_ends_at, Some(after(60)));

        let before = state.clone();
        let err = eng
            .start_construction(&mut state, METAL_MINE, after(10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyUnderConstruction);
        assert_eq!(state, before);
    }

    #[test]
    fn insufficient_metal_reports_shortfall() {
        let mut config = EngineConfig::default();
        config.starter_resources.set(ResourceKind::Metal, 50);
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let before = state.clone();
        let err = eng
            .start_construction(&mut state, METAL_MINE, t0())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientResources {
                shortfall: ResourceBundle::new().with(ResourceKind::Metal, 50)
            }
        );
        assert_eq!(err.to_string(), "insufficient resources: missing 50 metal");
        assert_eq!(state, before);
    }

    #[test]
    fn expired_timer_is_applied_on_next_read() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let started = eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let report = eng.advance(&mut state, after(61)).unwrap();
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].completed_at, after(60));
        let mine = state.building(started.building_id).unwrap();
        assert_eq!(mine.level, 1);
        assert_eq!(mine.construction_ends_at, None);
        assert_eq!(mine.phase(after(61)), BuildingPhase::Idle);
    }

    #[test]
    fn production_switches_level_at_completion_instant() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        // Nothing for the first 60s, then one hour at 30/h.
        eng.advance(&mut state, after(60 + 3600)).unwrap();
        assert_eq!(state.ledger.balance(ResourceKind::Metal), 430);
    }

    #[test]
    fn upgrade_uses_exponential_cost_and_longer_timer() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let first = eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let second = eng.upgrade(&mut state, first.building_id, after(60)).unwrap();
        assert_eq!(second.target_level, 2);
        assert_eq!(
            second.cost,
            ResourceBundle::new()
                .with(ResourceKind::Metal, 150)
                .with(ResourceKind::Crystal, 75)
        );
        assert_eq!(second.ends_at, after(60 + 120));
        assert_eq!(balances(&state), (250, 175, 200));
    }

    #[test]
    fn linear_formula_is_configurable() {
        let config = EngineConfig {
            cost_formula: CostFormula::Linear,
            ..EngineConfig::default()
        };
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let cost = eng.upgrade_cost(&state, SHELTER).unwrap();
        assert_eq!(cost.get(ResourceKind::Metal), 100);
        let shelter = shelter_id(&state);
        let started = eng.upgrade(&mut state, shelter, t0()).unwrap();
        assert_eq!(started.cost, cost);
    }

    #[test]
    fn one_upgrade_per_player_by_default() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let err = eng
            .start_construction(&mut state, CRYSTAL_MINE, t0())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::AlreadyUnderConstruction {
                building: "Metal Mine".into()
            }
        );
    }

    #[test]
    fn one_per_building_allows_parallel_upgrades() {
        let config = EngineConfig {
            concurrency: ConcurrencyPolicy::OnePerBuilding,
            ..EngineConfig::default()
        };
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        eng.start_construction(&mut state, CRYSTAL_MINE, t0()).unwrap();
        assert_eq!(balances(&state), (280, 190, 200));
        assert_eq!(state.upgrading().count(), 2);
    }

    #[test]
    fn prerequisites_are_enforced() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let err = eng.start_construction(&mut state, WAREHOUSE, t0()).unwrap_err();
        assert_eq!(
            err,
            EngineError::PrerequisiteNotMet {
                building: "Shelter".into(),
                required: 2,
                current: 1
            }
        );
    }

    #[test]
    fn founding_structure_is_required_first() {
        let config = EngineConfig {
            starter_buildings: vec![],
            ..EngineConfig::default()
        };
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let err = eng
            .start_construction(&mut state, METAL_MINE, t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PrerequisiteNotMet);

        let started = eng.start_construction(&mut state, SHELTER, t0()).unwrap();
        assert_eq!(started.target_level, 1);
        assert_eq!(started.ends_at, after(30));
        eng.advance(&mut state, after(30)).unwrap();
        eng.start_construction(&mut state, METAL_MINE, after(30))
            .unwrap();
    }

    #[test]
    fn max_level_blocks_upgrade() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let id = shelter_id(&state);
        state.building_mut(id).unwrap().level = 10;
        let err = eng.upgrade(&mut state, id, t0()).unwrap_err();
        assert_eq!(
            err,
            EngineError::AlreadyAtMaxLevel {
                building: "Shelter".into(),
                max_level: 10
            }
        );
        assert_eq!(eng.upgrade_cost(&state, SHELTER).unwrap_err().kind(), ErrorKind::AlreadyAtMaxLevel);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let err = eng
            .start_construction(&mut state, BuildingTypeId(404), t0())
            .unwrap_err();
        assert_eq!(err.to_string(), "building type not found: 404");
        let err = eng
            .upgrade(&mut state, PlayerBuildingId(404), t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn queued_upgrade_starts_when_active_one_completes() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let shelter = shelter_id(&state);
        let req = eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();
        assert_eq!(
            req,
            UpgradeRequest::Queued {
                building_id: shelter,
                target_level: 2,
                position: 1
            }
        );
        assert_eq!(eng.queue_depth(&state), 1);
        // Queued entries do not pay up front.
        assert_eq!(balances(&state), (400, 250, 200));

        let report = eng.advance(&mut state, after(60)).unwrap();
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.started.len(), 1);
        assert_eq!(eng.queue_depth(&state), 0);
        // Shelter 1 -> 2 costs floor(50 * 1.5) metal and floor(20 * 1.5) food.
        assert_eq!(balances(&state), (325, 250, 170));
        let b = state.building(shelter).unwrap();
        assert_eq!(b.construction_ends_at, Some(after(120)));
    }

    #[test]
    fn unaffordable_head_waits_for_production() {
        let mut config = EngineConfig::default();
        config.starter_resources = ResourceBundle::new()
            .with(ResourceKind::Metal, 120)
            .with(ResourceKind::Crystal, 60)
            .with(ResourceKind::Food, 50);
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let shelter = shelter_id(&state);
        eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();

        eng.advance(&mut state, after(60)).unwrap();
        assert_eq!(eng.queue_depth(&state), 1);
        assert_eq!(state.ledger.balance(ResourceKind::Metal), 20);

        eng.advance(&mut state, after(60 + 3600)).unwrap();
        assert_eq!(eng.queue_depth(&state), 1);
        assert_eq!(state.ledger.balance(ResourceKind::Metal), 50);

        // 55 more metal at 30/h takes 6600s.
        let report = eng.advance(&mut state, after(60 + 6600)).unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(eng.queue_depth(&state), 0);
        assert_eq!(balances(&state), (0, 10, 20));
        assert_eq!(
            state.building(shelter).unwrap().construction_ends_at,
            Some(after(60 + 6600 + 60))
        );
    }

    #[test]
    fn queued_chain_pays_for_each_level_as_it_starts() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let shelter = shelter_id(&state);
        for _ in 0..3 {
            eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();
        }
        assert_eq!(eng.queue_depth(&state), 2);
        assert_eq!(balances(&state), (425, 300, 170));

        // Only the next level is paid when the running one finishes.
        let mut partway = state.clone();
        eng.advance(&mut partway, after(60)).unwrap();
        assert_eq!(eng.queue_depth(&partway), 1);
        assert_eq!(balances(&partway), (313, 300, 125));

        let report = eng.advance(&mut state, after(271)).unwrap();
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.started.len(), 2);
        assert_eq!(report.started[0].ends_at, after(150));
        assert_eq!(report.started[1].ends_at, after(270));
        let b = state.building(shelter).unwrap();
        assert_eq!(b.level, 4);
        assert_eq!(b.construction_ends_at, None);
        assert_eq!(eng.queue_depth(&state), 0);
        // 500 - 75 - 112 - 168 metal, 200 - 30 - 45 - 67 food.
        assert_eq!(balances(&state), (145, 300, 58));
    }

    #[test]
    fn stale_queue_entries_are_dropped() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let shelter = shelter_id(&state);
        state.building_mut(shelter).unwrap().level = 10;
        for building_id in [PlayerBuildingId(404), shelter] {
            state.queue.push(UpgradeQueueEntry {
                building_id,
                target_level: 11,
                requested_at: t0(),
            });
        }
        let report = eng.advance(&mut state, after(1)).unwrap();
        assert!(report.started.is_empty());
        assert_eq!(eng.queue_depth(&state), 0);
        assert_eq!(balances(&state), (500, 300, 200));
    }

    #[test]
    fn busy_queue_entries_are_skipped_per_building() {
        let config = EngineConfig {
            concurrency: ConcurrencyPolicy::OnePerBuilding,
            ..EngineConfig::default()
        };
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let shelter = shelter_id(&state);
        let mine = eng
            .start_construction(&mut state, METAL_MINE, t0())
            .unwrap()
            .building_id;
        eng.advance(&mut state, after(60)).unwrap();
        eng.upgrade(&mut state, shelter, after(60)).unwrap();
        eng.enqueue_upgrade(&mut state, shelter, after(60)).unwrap();
        let req = eng.enqueue_upgrade(&mut state, mine, after(60)).unwrap();
        assert!(matches!(req, UpgradeRequest::Queued { target_level: 2, position: 2, .. }));

        let report = eng.advance(&mut state, after(61)).unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].building_id, mine);
        assert_eq!(eng.queue_depth(&state), 1);
        assert_eq!(state.queue[0].building_id, shelter);
        assert_eq!(balances(&state), (175, 175, 170));
    }

    #[test]
    fn oversized_production_is_an_arithmetic_error() {
        let mut cat = crate::fixtures::catalog();
        let mine = cat
            .buildings
            .iter_mut()
            .find(|b| b.id == METAL_MINE)
            .unwrap();
        mine.base_production = Decimal::from_i128_with_scale(7 * 10_i128.pow(28), 0);
        mine.production_bonus_per_level = Decimal::ONE;
        let eng = ConstructionEngine::new(Arc::new(cat), EngineConfig::default());
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let id = state.insert_building(METAL_MINE);
        state.building_mut(id).unwrap().level = 5;
        let before = state.clone();

        let err = eng.advance(&mut state, after(60)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert_eq!(state, before);
        assert_eq!(eng.snapshot(&state, t0()).unwrap_err().kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn enqueue_tracks_target_levels_and_depth() {
        let config = EngineConfig {
            max_queue_depth: 2,
            ..EngineConfig::default()
        };
        let eng = engine_with(config);
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let shelter = shelter_id(&state);

        let first = eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();
        assert!(matches!(first, UpgradeRequest::Started(ref s) if s.target_level == 2));

        let second = eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();
        assert!(matches!(second, UpgradeRequest::Queued { target_level: 3, position: 1, .. }));
        let third = eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap();
        assert!(matches!(third, UpgradeRequest::Queued { target_level: 4, position: 2, .. }));

        let err = eng.enqueue_upgrade(&mut state, shelter, t0()).unwrap_err();
        assert_eq!(err, EngineError::QueueFull(2));
    }

    #[test]
    fn tick_alone_does_not_accrue() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        eng.start_construction(&mut state, METAL_MINE, t0()).unwrap();
        let report = eng.tick(&mut state, after(7200));
        assert_eq!(report.completed.len(), 1);
        assert_eq!(state.ledger.last_accrued_at(), t0());
        assert!(eng.tick(&mut state, after(7200)).is_empty());
    }

    #[test]
    fn shortfall_preview_lists_missing_amounts() {
        let mut config = EngineConfig::default();
        config.starter_resources.set(ResourceKind::Crystal, 20);
        let eng = engine_with(config);
        let state = eng.new_colony(player(), t0()).unwrap();
        let missing = eng.shortfall(&state, METAL_MINE).unwrap();
        assert_eq!(missing, ResourceBundle::new().with(ResourceKind::Crystal, 30));
        assert!(eng.shortfall(&state, SHELTER).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn polling_pattern_does_not_change_outcome(polls in proptest::collection::vec(1i64..4_000, 1..12)) {
            let eng = engine();
            let mut once = eng.new_colony(player(), t0()).unwrap();
            eng.start_construction(&mut once, METAL_MINE, t0()).unwrap();
            let mut polled = once.clone();

            let mut at = 0;
            for step in &polls {
                at += step;
                eng.advance(&mut polled, after(at)).unwrap();
            }
            eng.advance(&mut once, after(at)).unwrap();
            prop_assert_eq!(polled.ledger.balances(), once.ledger.balances());
            prop_assert_eq!(&polled.buildings, &once.buildings);
        }
    }
}
