use gridsync_engine::CellStorage;
use std::sync::Arc;
use tracing::trace;

use crate::key::CellKey;
use crate::map::{SharedMap, Value};

/// Adapter lifecycle flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterState {
    /// Set once construction finishes; never cleared.
    pub ready: bool,
    /// The store already held a grid when the adapter attached.
    pub existing: bool,
}

/// Storage hooks that keep workbook cells under `"<row>,<col>"` keys.
///
/// Reads go straight to the map. Writes are staged and reach the map only
/// through [`publish`], which the adapter calls once the workbook lock is
/// released: `set` notifies listeners synchronously and they may read the
/// adapter back.
pub struct MapCellStorage<M> {
    map: Arc<M>,
    state: AdapterState,
    pending: Vec<(CellKey, String)>,
}

impl<M: SharedMap> MapCellStorage<M> {
    pub(crate) fn new(map: Arc<M>, existing: bool) -> Self {
        MapCellStorage {
            map,
            state: AdapterState {
                ready: false,
                existing,
            },
            pending: Vec::new(),
        }
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state.ready = true;
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Writes staged since the last call, oldest first.
    pub(crate) fn take_pending(&mut self) -> Vec<(CellKey, String)> {
        std::mem::take(&mut self.pending)
    }
}

/// Write staged cell text to the map.
pub(crate) fn publish<M: SharedMap>(map: &M, writes: Vec<(CellKey, String)>) {
    for (key, text) in writes {
        map.set(&key.to_string(), Value::from(text));
    }
}

impl<M: SharedMap> CellStorage for MapCellStorage<M> {
    fn load_cell_text(&self, row: usize, col: usize) -> String {
        self.map
            .get(&CellKey::encode(row, col))
            .map(|v| v.to_text())
            .unwrap_or_default()
    }

    fn store_cell_text(&mut self, row: usize, col: usize, text: &str) {
        // While seeding from an existing store the workbook replays content
        // that is already canonical there; writing it back would re-broadcast it.
        if !self.state.ready && self.state.existing {
            trace!(row, col, "seed replay not written back");
            return;
        }
        self.pending.push((CellKey::new(row, col), text.to_string()));
    }
}
