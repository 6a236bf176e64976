use crate::{ConstructionEngine, EngineConfig};
use chrono::{DateTime, TimeDelta, Utc};
use colony_core::{Catalog, PlayerId};
use std::path::PathBuf;
use std::sync::Arc;

pub fn catalog() -> Catalog {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/catalog.yaml");
    colony_core::load_catalog(path).unwrap()
}

pub fn engine() -> ConstructionEngine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> ConstructionEngine {
    ConstructionEngine::new(Arc::new(catalog()), config)
}

pub fn player() -> PlayerId {
    PlayerId("commander-7".into())
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn after(secs: i64) -> DateTime<Utc> {
    t0() + TimeDelta::try_seconds(secs).unwrap()
}
