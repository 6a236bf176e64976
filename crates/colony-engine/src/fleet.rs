//! Ship construction. Ships are delivered as soon as they are paid for.

use crate::construction::{atomically, ConstructionEngine};
use crate::error::EngineError;
use crate::state::ColonyState;
use chrono::{DateTime, Utc};
use colony_core::{ResourceBundle, ShipTypeId};
use colony_econ::EconError;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShipsBuilt {
    pub ship_type_id: ShipTypeId,
    pub name: String,
    pub quantity: u64,
    pub cost: ResourceBundle,
    /// Fleet size of this type after the build.
    pub total: u64,
}

impl ConstructionEngine {
    /// Pay `quantity` times the unit cost and add the ships to the fleet.
    pub fn build_ships(
        &self,
        state: &mut ColonyState,
        ship_type_id: ShipTypeId,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Result<ShipsBuilt, EngineError> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity);
        }
        atomically(state, |s| {
            self.advance_in_place(s, now)?;
            let def = self
                .catalog()
                .ship(ship_type_id)
                .ok_or_else(|| EngineError::not_found("ship type", ship_type_id))?;
            self.check_requirements(s, &def.unlock_requirement)?;
            let cost = def
                .unit_cost()
                .checked_scale(quantity)
                .ok_or(EconError::Overflow("fleet cost"))?;
            s.ledger.deduct(&cost)?;
            let total = s.add_ships(ship_type_id, quantity);
            info!(player = %s.player_id, ship = %def.name, quantity, total, "ships built");
            Ok(ShipsBuilt {
                ship_type_id,
                name: def.name.clone(),
                quantity,
                cost,
                total,
            })
        })
    }
}
