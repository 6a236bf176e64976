//! Persistence contract for colonies plus an in-memory implementation.

use crate::error::StoreError;
use crate::state::ColonyState;
use colony_core::PlayerId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// Durable storage of one versioned record per player.
///
/// `save` is a compare-and-swap: `state.version` must be the version the
/// caller loaded (0 for a colony that was never saved). On success the new
/// version is returned; a stale version yields [`StoreError::Conflict`] and
/// leaves the stored record untouched.
pub trait ColonyStore: Send + Sync {
    fn load(
        &self,
        player: &PlayerId,
    ) -> impl Future<Output = Result<Option<ColonyState>, StoreError>> + Send;

    fn save(&self, state: &ColonyState) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Process-local store, used by tests and single-process tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    colonies: Mutex<HashMap<PlayerId, ColonyState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<PlayerId, ColonyState>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .colonies
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        f(&mut guard)
    }
}

impl ColonyStore for MemoryStore {
    async fn load(&self, player: &PlayerId) -> Result<Option<ColonyState>, StoreError> {
        self.with_map(|m| Ok(m.get(player).cloned()))
    }

    async fn save(&self, state: &ColonyState) -> Result<u64, StoreError> {
        self.with_map(|m| {
            let stored = m.get(&state.player_id).map(|s| s.version).unwrap_or(0);
            if stored != state.version {
                return Err(StoreError::Conflict {
                    player: state.player_id.clone(),
                    expected: state.version,
                });
            }
            let next = stored + 1;
            let mut record = state.clone();
            record.version = next;
            m.insert(state.player_id.clone(), record);
            Ok(next)
        })
    }
}
