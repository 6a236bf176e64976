#![deny(warnings)]

//! Core domain models and invariants for the colony engine.
//!
//! This crate defines the serializable catalog (building, ship and tech
//! definitions), resource bundles and identifiers shared by every other crate,
//! together with validation helpers that guard catalog invariants.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// A resource tracked per player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Metal,
    Crystal,
    Food,
    Power,
}

impl ResourceKind {
    /// Every resource kind, in ledger order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Metal,
        ResourceKind::Crystal,
        ResourceKind::Food,
        ResourceKind::Power,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Metal => "metal",
            ResourceKind::Crystal => "crystal",
            ResourceKind::Food => "food",
            ResourceKind::Power => "power",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative whole quantities keyed by resource kind.
///
/// Used both for balances and for costs. Missing kinds read as zero, and
/// equality ignores zero entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceBundle(BTreeMap<ResourceKind, u64>);

impl PartialEq for ResourceBundle {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ResourceBundle {}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, kind: ResourceKind, amount: u64) -> Self {
        self.set(kind, amount);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn set(&mut self, kind: ResourceKind, amount: u64) {
        self.0.insert(kind, amount);
    }

    /// Adds `amount`, saturating at `u64::MAX`.
    pub fn add(&mut self, kind: ResourceKind, amount: u64) {
        let cur = self.get(kind);
        self.set(kind, cur.saturating_add(amount));
    }

    /// Iterates non-zero entries in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u64)> + '_ {
        self.0.iter().filter(|(_, &v)| v > 0).map(|(&k, &v)| (k, v))
    }

    /// True when every entry is zero.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Multiplies every entry by `factor`; `None` on overflow.
    pub fn checked_scale(&self, factor: u64) -> Option<ResourceBundle> {
        let mut out = ResourceBundle::new();
        for (k, v) in self.iter() {
            out.set(k, v.checked_mul(factor)?);
        }
        Some(out)
    }

    /// Amount missing per kind for `self` to cover `cost`. Empty when affordable.
    pub fn shortfall(&self, cost: &ResourceBundle) -> ResourceBundle {
        cost.iter()
            .filter_map(|(k, need)| {
                let have = self.get(k);
                (have < need).then(|| (k, need - have))
            })
            .collect()
    }

    /// True when `self` holds at least `cost` of every kind.
    pub fn covers(&self, cost: &ResourceBundle) -> bool {
        self.shortfall(cost).is_empty()
    }
}

impl FromIterator<(ResourceKind, u64)> for ResourceBundle {
    fn from_iter<I: IntoIterator<Item = (ResourceKind, u64)>>(iter: I) -> Self {
        ResourceBundle(iter.into_iter().collect())
    }
}

impl fmt::Display for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{v} {k}")?;
            first = false;
        }
        if first {
            f.write_str("nothing")?;
        }
        Ok(())
    }
}

/// Opaque authenticated player identifier supplied by the identity layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! numeric_id {
    ($(#[$m:meta])* $name:ident($inner:ty)) => {
        $(#[$m])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Catalog identifier of a building type.
    BuildingTypeId(u32)
);
numeric_id!(
    /// Catalog identifier of a ship type.
    ShipTypeId(u32)
);
numeric_id!(
    /// Catalog identifier of a technology.
    TechTypeId(u32)
);
numeric_id!(
    /// Identifier of a building instance owned by a player.
    PlayerBuildingId(u64)
);

/// A named building that must be present at a minimum level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerequisite {
    /// Building type name, e.g. "Shelter".
    pub building: String,
    /// Minimum completed level.
    pub level: u32,
}

/// Static definition of a building type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildingTypeDef {
    pub id: BuildingTypeId,
    /// Unique display name; prerequisites refer to buildings by name.
    pub name: String,
    /// Ordering hint only.
    #[serde(default)]
    pub tier: u32,
    /// Cost of the first level; upgrades scale it.
    #[serde(default)]
    pub cost: ResourceBundle,
    /// Resource this building produces, if any.
    #[serde(default)]
    pub produces: Option<ResourceKind>,
    /// Resources this building adds storage for.
    #[serde(default)]
    pub stores: Vec<ResourceKind>,
    #[serde(default)]
    pub base_production: Decimal,
    #[serde(default)]
    pub production_bonus_per_level: Decimal,
    #[serde(default)]
    pub base_storage: Decimal,
    #[serde(default)]
    pub storage_bonus_per_level: Decimal,
    #[serde(default)]
    pub base_power_generation: Decimal,
    #[serde(default)]
    pub power_generation_per_level: Decimal,
    /// Power drawn per level.
    #[serde(default)]
    pub power_usage: Decimal,
    pub max_level: u32,
    /// Duration of the first level; upgrades scale it.
    pub construction_time_seconds: u32,
    #[serde(default)]
    pub requirements: Vec<Prerequisite>,
}

/// Static definition of a fleet unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShipTypeDef {
    pub id: ShipTypeId,
    pub name: String,
    #[serde(default)]
    pub tier: u32,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub metal_cost: u64,
    #[serde(default)]
    pub food_cost: u64,
    /// Paid from the power balance.
    #[serde(default)]
    pub energy_cost: u64,
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default)]
    pub speed: u32,
    #[serde(default)]
    pub hp: u32,
    #[serde(default)]
    pub crew_food_per_hour: u32,
    #[serde(default)]
    pub unlock_requirement: Vec<Prerequisite>,
}

impl ShipTypeDef {
    /// Cost of a single unit.
    pub fn unit_cost(&self) -> ResourceBundle {
        ResourceBundle::new()
            .with(ResourceKind::Metal, self.metal_cost)
            .with(ResourceKind::Food, self.food_cost)
            .with(ResourceKind::Power, self.energy_cost)
    }
}

/// Static definition of a researchable technology.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TechTypeDef {
    pub id: TechTypeId,
    pub name: String,
    /// Free-form description of what the tech unlocks.
    #[serde(default)]
    pub unlocks: String,
    pub required_lab_level: u32,
}

/// Read-only catalog supplied by the catalog collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub buildings: Vec<BuildingTypeDef>,
    #[serde(default)]
    pub ships: Vec<ShipTypeDef>,
    #[serde(default)]
    pub techs: Vec<TechTypeDef>,
}

impl Catalog {
    pub fn building(&self, id: BuildingTypeId) -> Option<&BuildingTypeDef> {
        self.buildings.iter().find(|b| b.id == id)
    }

    pub fn building_by_name(&self, name: &str) -> Option<&BuildingTypeDef> {
        self.buildings.iter().find(|b| b.name == name)
    }

    pub fn ship(&self, id: ShipTypeId) -> Option<&ShipTypeDef> {
        self.ships.iter().find(|s| s.id == id)
    }

    pub fn ship_by_name(&self, name: &str) -> Option<&ShipTypeDef> {
        self.ships.iter().find(|s| s.name == name)
    }

    pub fn tech(&self, id: TechTypeId) -> Option<&TechTypeDef> {
        self.techs.iter().find(|t| t.id == id)
    }

    pub fn tech_by_name(&self, name: &str) -> Option<&TechTypeDef> {
        self.techs.iter().find(|t| t.name == name)
    }

    /// Parse and validate a YAML catalog document.
    pub fn from_yaml_str(text: &str) -> Result<Catalog, CatalogError> {
        let catalog: Catalog =
            serde_yaml::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        validate_catalog(&catalog)?;
        debug!(
            buildings = catalog.buildings.len(),
            ships = catalog.ships.len(),
            techs = catalog.techs.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }
}

/// Load and validate a YAML catalog from disk.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog, CatalogError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| CatalogError::Io(format!("{}: {e}", path.as_ref().display())))?;
    Catalog::from_yaml_str(&text)
}

/// Validation errors for catalog invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Names must be non-empty.
    #[error("empty name for {0}")]
    EmptyName(String),
    /// Identifiers and names must be unique within their list.
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    /// Coefficients must be non-negative.
    #[error("negative coefficient on {0}")]
    NegativeCoefficient(String),
    /// A building needs at least one level.
    #[error("max_level must be >= 1 for {0}")]
    ZeroMaxLevel(String),
    /// A prerequisite names a building absent from the catalog.
    #[error("prerequisite not found: {0}")]
    PrerequisiteNotFound(String),
}

/// Errors raised while loading a catalog document.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Validate a single building definition.
pub fn validate_building(b: &BuildingTypeDef) -> Result<(), ValidationError> {
    if b.name.trim().is_empty() {
        return Err(ValidationError::EmptyName(format!("building {}", b.id)));
    }
    if b.max_level == 0 {
        return Err(ValidationError::ZeroMaxLevel(b.name.clone()));
    }
    let coefficients = [
        b.base_production,
        b.production_bonus_per_level,
        b.base_storage,
        b.storage_bonus_per_level,
        b.base_power_generation,
        b.power_generation_per_level,
        b.power_usage,
    ];
    if coefficients.iter().any(|c| c.is_sign_negative() && !c.is_zero()) {
        return Err(ValidationError::NegativeCoefficient(b.name.clone()));
    }
    Ok(())
}

/// Validate a single ship definition.
pub fn validate_ship(s: &ShipTypeDef) -> Result<(), ValidationError> {
    if s.name.trim().is_empty() {
        return Err(ValidationError::EmptyName(format!("ship {}", s.id)));
    }
    Ok(())
}

/// Validate the catalog, including cross-references from prerequisites.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), ValidationError> {
    let mut ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    for b in &catalog.buildings {
        validate_building(b)?;
        if !ids.insert(b.id) || !names.insert(b.name.as_str()) {
            return Err(ValidationError::Duplicate(b.name.clone()));
        }
    }

    let mut ship_ids = BTreeSet::new();
    let mut ship_names = BTreeSet::new();
    for s in &catalog.ships {
        validate_ship(s)?;
        if !ship_ids.insert(s.id) || !ship_names.insert(s.name.as_str()) {
            return Err(ValidationError::Duplicate(s.name.clone()));
        }
    }

    let mut tech_ids = BTreeSet::new();
    let mut tech_names = BTreeSet::new();
    for t in &catalog.techs {
        if t.name.trim().is_empty() {
            return Err(ValidationError::EmptyName(format!("tech {}", t.id)));
        }
        if !tech_ids.insert(t.id) || !tech_names.insert(t.name.as_str()) {
            return Err(ValidationError::Duplicate(t.name.clone()));
        }
    }

    let requirements = catalog
        .buildings
        .iter()
        .flat_map(|b| b.requirements.iter())
        .chain(catalog.ships.iter().flat_map(|s| s.unlock_requirement.iter()));
    for req in requirements {
        if !names.contains(req.building.as_str()) {
            return Err(ValidationError::PrerequisiteNotFound(req.building.clone()));
        }
    }
    Ok(())
}
