//! Technology unlocks gated by the research building's level.

use crate::construction::{atomically, ConstructionEngine};
use crate::error::EngineError;
use crate::state::ColonyState;
use chrono::{DateTime, Utc};
use colony_core::TechTypeId;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TechUnlocked {
    pub tech_type_id: TechTypeId,
    pub name: String,
    pub unlocks: String,
}

impl ConstructionEngine {
    pub fn research(
        &self,
        state: &mut ColonyState,
        tech_type_id: TechTypeId,
        now: DateTime<Utc>,
    ) -> Result<TechUnlocked, EngineError> {
        atomically(state, |s| {
            self.advance_in_place(s, now)?;
            let def = self
                .catalog()
                .tech(tech_type_id)
                .ok_or_else(|| EngineError::not_found("tech", tech_type_id))?;
            if s.techs.contains(&tech_type_id) {
                return Err(EngineError::AlreadyUnlocked(def.name.clone()));
            }
            let lab = &self.config().research_building;
            let current = s.level_by_name(self.catalog(), lab);
            if current < def.required_lab_level {
                return Err(EngineError::PrerequisiteNotMet {
                    building: lab.clone(),
                    required: def.required_lab_level,
                    current,
                });
            }
            s.techs.insert(tech_type_id);
            info!(player = %s.player_id, tech = %def.name, "tech unlocked");
            Ok(TechUnlocked {
                tech_type_id,
                name: def.name.clone(),
                unlocks: def.unlocks.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{engine, player, t0};
    use colony_core::BuildingTypeId;

    #[test]
    fn lab_level_gates_research() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let err = eng.research(&mut state, TechTypeId(1), t0()).unwrap_err();
        assert_eq!(
            err,
            EngineError::PrerequisiteNotMet {
                building: "Research Lab".into(),
                required: 1,
                current: 0
            }
        );

        let lab = state.insert_building(BuildingTypeId(7));
        state.building_mut(lab).unwrap().level = 2;
        let unlocked = eng.research(&mut state, TechTypeId(2), t0()).unwrap();
        assert_eq!(unlocked.name, "Crystal Resonance");
        assert!(state.techs.contains(&TechTypeId(2)));

        let err = eng.research(&mut state, TechTypeId(3), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PrerequisiteNotMet);
    }

    #[test]
    fn researching_twice_fails() {
        let eng = engine();
        let mut state = eng.new_colony(player(), t0()).unwrap();
        let lab = state.insert_building(BuildingTypeId(7));
        state.building_mut(lab).unwrap().level = 1;
        eng.research(&mut state, TechTypeId(1), t0()).unwrap();
        let err = eng.research(&mut state, TechTypeId(1), t0()).unwrap_err();
        assert_eq!(err, EngineError::AlreadyUnlocked("Advanced Metallurgy".into()));
        assert_eq!(
            eng.research(&mut state, TechTypeId(9), t0()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
