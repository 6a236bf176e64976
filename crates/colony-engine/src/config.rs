//! Engine policies, loadable from YAML.

use crate::error::ConfigError;
use colony_core::{Prerequisite, ResourceBundle, ResourceKind};
use colony_econ::CostFormula;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How many upgrades may run at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// At most one building per player is upgrading.
    #[default]
    OnePerPlayer,
    /// Each building may upgrade independently.
    OnePerBuilding,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Clamp accrual of metal, crystal and food at storage capacity.
    pub enforce_cap: bool,
    /// Capacity available before any storage building.
    pub base_capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enforce_cap: false,
            base_capacity: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency: ConcurrencyPolicy,
    pub cost_formula: CostFormula,
    /// Every other building requires this one at level >= 1.
    pub founding_building: String,
    /// Gates research by its level.
    pub research_building: String,
    pub starter_resources: ResourceBundle,
    pub starter_buildings: Vec<Prerequisite>,
    pub max_queue_depth: usize,
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyPolicy::default(),
            cost_formula: CostFormula::default(),
            founding_building: "Shelter".to_string(),
            research_building: "Research Lab".to_string(),
            starter_resources: ResourceBundle::new()
                .with(ResourceKind::Metal, 500)
                .with(ResourceKind::Crystal, 300)
                .with(ResourceKind::Food, 200)
                .with(ResourceKind::Power, 0),
            starter_buildings: vec![Prerequisite {
                building: "Shelter".to_string(),
                level: 1,
            }],
            max_queue_depth: 5,
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject policies that would let an upgrade cost less than the last.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.cost_formula {
            CostFormula::Exponential { factor } if *factor <= Decimal::ONE => {
                Err(ConfigError::CostFactor(*factor))
            }
            _ => Ok(()),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = EngineConfig::from_yaml_str(
            "concurrency: one_per_building\ncost_formula: { kind: linear }\nmax_queue_depth: 2\n",
        )
        .unwrap();
        assert_eq!(cfg.concurrency, ConcurrencyPolicy::OnePerBuilding);
        assert_eq!(cfg.cost_formula, CostFormula::Linear);
        assert_eq!(cfg.max_queue_depth, 2);
        assert_eq!(cfg.founding_building, "Shelter");
    }

    #[test]
    fn flat_or_shrinking_factors_are_rejected() {
        for factor in ["1", "0.8", "0", "-2"] {
            let doc = format!("cost_formula: {{ kind: exponential, factor: {factor} }}\n");
            let err = EngineConfig::from_yaml_str(&doc).unwrap_err();
            assert!(matches!(err, ConfigError::CostFactor(_)), "{factor}: {err}");
        }
        let ok = EngineConfig::from_yaml_str("cost_formula: { kind: exponential, factor: 1.25 }\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn bundled_asset_matches_defaults() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/engine.yaml");
        let cfg = EngineConfig::load(path).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }
}
