#![deny(warnings)]

//! Production and cost formulas for the colony engine.
//!
//! This module provides pure, validated helpers for:
//! - Hourly production, storage capacity and power figures per building level
//! - Upgrade cost scaling (exponential or linear in the current level)
//! - Construction duration scaling
//! - Converting an hourly rate and an elapsed window into accrued quantity
//!   without losing fractions

use colony_core::{BuildingTypeDef, ResourceBundle, ResourceKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale applied to accrual amounts.
pub const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Growth factor must be strictly positive.
    #[error("invalid cost growth factor: {0}")]
    InvalidFactor(Decimal),
    /// Intermediate value exceeded the representable range.
    #[error("arithmetic overflow while scaling {0}")]
    Overflow(&'static str),
}

/// How upgrade costs grow with level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostFormula {
    /// `floor(base * factor^current_level)`.
    Exponential { factor: Decimal },
    /// `base * (current_level + 1)`.
    Linear,
}

impl Default for CostFormula {
    fn default() -> Self {
        CostFormula::Exponential {
            factor: Decimal::new(15, 1),
        }
    }
}

/// `base * level * (1 + (level - 1) * bonus)`; zero at level 0.
///
/// The bonus compounds with the level count, so a level-3 building with base
/// 30 and bonus 0.1 yields `30 * 3 * 1.2 = 108`.
pub fn level_scaled(
    base: Decimal,
    level: u32,
    bonus: Decimal,
    what: &'static str,
) -> Result<Decimal, EconError> {
    if level == 0 {
        return Ok(Decimal::ZERO);
    }
    let l = Decimal::from(level);
    let growth = (l - Decimal::ONE)
        .checked_mul(bonus)
        .and_then(|g| g.checked_add(Decimal::ONE))
        .ok_or(EconError::Overflow(what))?;
    base.checked_mul(l)
        .and_then(|v| v.checked_mul(growth))
        .ok_or(EconError::Overflow(what))
}

/// Hourly production of `kind` by a building at `level`.
///
/// Power uses only the per-level generation rate. Other kinds are produced
/// only by buildings whose `produces` matches.
pub fn hourly_rate(
    def: &BuildingTypeDef,
    level: u32,
    kind: ResourceKind,
) -> Result<Decimal, EconError> {
    match kind {
        ResourceKind::Power => power_generation(def, level),
        k if def.produces == Some(k) => level_scaled(
            def.base_production,
            level,
            def.production_bonus_per_level,
            "production rate",
        ),
        _ => Ok(Decimal::ZERO),
    }
}

/// Storage a building contributes to each kind it stores.
pub fn storage_capacity(def: &BuildingTypeDef, level: u32) -> Result<Decimal, EconError> {
    if def.stores.is_empty() {
        return Ok(Decimal::ZERO);
    }
    level_scaled(
        def.base_storage,
        level,
        def.storage_bonus_per_level,
        "storage capacity",
    )
}

/// Power generated per hour: `level * power_generation_per_level`.
pub fn power_generation(def: &BuildingTypeDef, level: u32) -> Result<Decimal, EconError> {
    Decimal::from(level)
        .checked_mul(def.power_generation_per_level)
        .ok_or(EconError::Overflow("power generation"))
}

/// Power drawn per hour: `level * power_usage`.
pub fn power_consumption(def: &BuildingTypeDef, level: u32) -> Result<Decimal, EconError> {
    Decimal::from(level)
        .checked_mul(def.power_usage)
        .ok_or(EconError::Overflow("power consumption"))
}

/// Cost of raising a building from `current_level` to `current_level + 1`.
///
/// A first-time build has `current_level == 0` and pays the base cost under
/// either formula.
pub fn upgrade_cost(
    base: &ResourceBundle,
    current_level: u32,
    formula: &CostFormula,
) -> Result<ResourceBundle, EconError> {
    match formula {
        CostFormula::Linear => {
            let next = u64::from(current_level) + 1;
            base.checked_scale(next).ok_or(EconError::Overflow("linear cost"))
        }
        CostFormula::Exponential { factor } => {
            if *factor <= Decimal::ZERO {
                return Err(EconError::InvalidFactor(*factor));
            }
            let mut mult = Decimal::ONE;
            for _ in 0..current_level {
                mult = mult
                    .checked_mul(*factor)
                    .ok_or(EconError::Overflow("cost factor"))?;
            }
            let mut out = ResourceBundle::new();
            for (kind, amount) in base.iter() {
                let scaled = Decimal::from(amount)
                    .checked_mul(mult)
                    .ok_or(EconError::Overflow("exponential cost"))?
                    .floor();
                let whole = scaled.to_u64().ok_or(EconError::Overflow("exponential cost"))?;
                out.set(kind, whole);
            }
            Ok(out)
        }
    }
}

/// Seconds needed to reach `target_level`: `base_secs * target_level`.
pub fn construction_duration_secs(base_secs: u32, target_level: u32) -> u64 {
    u64::from(base_secs) * u64::from(target_level.max(1))
}

/// Production at `rate_per_hour` over `elapsed_ms`, scaled by [`MILLIS_PER_HOUR`].
///
/// Keeping the scale avoids dividing, so remainders carried between windows
/// stay exact. Non-positive windows yield zero.
pub fn scaled_accrual(rate_per_hour: Decimal, elapsed_ms: i64) -> Result<Decimal, EconError> {
    if elapsed_ms <= 0 || rate_per_hour <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    rate_per_hour
        .checked_mul(Decimal::from(elapsed_ms))
        .ok_or(EconError::Overflow("accrual"))
}

/// Split a scaled amount into whole units (saturating) and the scaled remainder.
pub fn split_scaled(scaled: Decimal) -> (u64, Decimal) {
    if scaled <= Decimal::ZERO {
        return (0, Decimal::ZERO);
    }
    let hour = Decimal::from(MILLIS_PER_HOUR);
    let mut whole = (scaled / hour).floor();
    let mut rem = scaled - whole * hour;
    if rem < Decimal::ZERO {
        whole -= Decimal::ONE;
        rem += hour;
    } else if rem >= hour {
        whole += Decimal::ONE;
        rem -= hour;
    }
    (whole.to_u64().unwrap_or(u64::MAX), rem)
}
