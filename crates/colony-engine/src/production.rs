//! Aggregate production, storage and power figures for a colony.

use crate::config::StorageConfig;
use crate::state::PlayerBuilding;
use colony_core::{Catalog, ResourceKind};
use colony_econ::{
    hourly_rate, power_consumption, power_generation, storage_capacity, EconError,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Colony-wide figures at the buildings' completed levels.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProductionSummary {
    /// Units per hour by resource.
    pub rates: BTreeMap<ResourceKind, Decimal>,
    /// Storage contributed by buildings, by resource.
    pub storage: BTreeMap<ResourceKind, Decimal>,
    pub power_generation: Decimal,
    pub power_consumption: Decimal,
}

impl ProductionSummary {
    pub fn rate(&self, kind: ResourceKind) -> Decimal {
        self.rates.get(&kind).copied().unwrap_or(Decimal::ZERO)
    }

    /// Generation minus consumption; negative when the grid is overdrawn.
    pub fn power_balance(&self) -> Decimal {
        self.power_generation - self.power_consumption
    }

    /// Accrual caps for metal, crystal and food, when enforcement is on.
    pub fn caps(&self, storage: &StorageConfig) -> Option<BTreeMap<ResourceKind, u64>> {
        if !storage.enforce_cap {
            return None;
        }
        let caps = [ResourceKind::Metal, ResourceKind::Crystal, ResourceKind::Food]
            .into_iter()
            .map(|kind| {
                let built = self
                    .storage
                    .get(&kind)
                    .and_then(|d| d.floor().to_u64())
                    .unwrap_or(0);
                (kind, storage.base_capacity.saturating_add(built))
            })
            .collect();
        Some(caps)
    }
}

/// Sum production over `buildings` at their completed `level`.
///
/// A building still upgrading counts at its pre-upgrade level. Buildings
/// whose type is missing from the catalog are skipped.
pub fn summarize<'a, I>(catalog: &Catalog, buildings: I) -> Result<ProductionSummary, EconError>
where
    I: IntoIterator<Item = &'a PlayerBuilding>,
{
    let mut out = ProductionSummary::default();
    for b in buildings {
        let Some(def) = catalog.building(b.building_type_id) else {
            continue;
        };
        for kind in ResourceKind::ALL {
            let rate = hourly_rate(def, b.level, kind)?;
            if !rate.is_zero() {
                add_to(out.rates.entry(kind).or_insert(Decimal::ZERO), rate, "production rate")?;
            }
        }
        let cap = storage_capacity(def, b.level)?;
        if !cap.is_zero() {
            for kind in &def.stores {
                add_to(out.storage.entry(*kind).or_insert(Decimal::ZERO), cap, "storage capacity")?;
            }
        }
        add_to(
            &mut out.power_generation,
            power_generation(def, b.level)?,
            "power generation",
        )?;
        add_to(
            &mut out.power_consumption,
            power_consumption(def, b.level)?,
            "power consumption",
        )?;
    }
    Ok(out)
}

fn add_to(total: &mut Decimal, amount: Decimal, what: &'static str) -> Result<(), EconError> {
    *total = total.checked_add(amount).ok_or(EconError::Overflow(what))?;
    Ok(())
}
