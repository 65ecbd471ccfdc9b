//! A workbook bound to a replicated map.
//!
//! [`SharedWorkbook`] keeps a local [`Workbook`] in step with a store shared
//! by several participants:
//!
//! - on construction it adopts the grid already in the store, or publishes
//!   its own dimensions and seed when the store is empty;
//! - local edits are written through to the store under `"<row>,<col>"`;
//! - changes made by other participants are pushed into the local workbook
//!   as remote edits, while notifications echoing its own writes are
//!   ignored.

mod resolve;
mod storage;

pub use resolve::{GridDimensions, MAX_CELLS};
pub use storage::{AdapterState, MapCellStorage};

use gridsync_engine::{EditOrigin, Workbook};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

use crate::error::{Result, SyncError};
use crate::key::StoreKey;
use crate::map::{Listener, MapEvent, SharedMap, Subscription, VALUE_CHANGED};

type Engine<M> = Workbook<MapCellStorage<M>>;

/// A workbook whose cells live in a replicated map.
///
/// All access to the local workbook goes through one mutex, so store
/// notifications and local edits are applied one at a time. That mutex is
/// never held while writing to the map, so listeners may read the adapter
/// from any notification. The map must not deliver remote changes from
/// inside its own `set`.
pub struct SharedWorkbook<M: SharedMap + 'static> {
    map: Arc<M>,
    workbook: Arc<Mutex<Engine<M>>>,
    /// Held from a local edit until its write reaches the map, so the store
    /// sees local edits in the order they were applied. Re-entrant: a
    /// listener may edit from inside the notification of an earlier edit.
    writer: ReentrantMutex<()>,
    dimensions: GridDimensions,
    faults: Arc<Mutex<Vec<SyncError>>>,
    _router: Subscription,
}

impl<M: SharedMap + 'static> SharedWorkbook<M> {
    /// Attach a workbook to `map`.
    ///
    /// `num_rows`, `num_cols` and `init` only apply when the store holds no
    /// grid yet; otherwise the store's grid is adopted as is.
    pub fn new(
        map: Arc<M>,
        num_rows: usize,
        num_cols: usize,
        init: Option<Vec<Vec<String>>>,
    ) -> Result<Self> {
        let requested = GridDimensions::new(num_rows, num_cols);
        let resolution = resolve::resolve(map.as_ref(), requested, init)?;
        let dimensions = resolution.dimensions;

        let storage = MapCellStorage::new(map.clone(), resolution.existing);
        let mut workbook = Workbook::new(dimensions.num_rows, dimensions.num_cols, storage);
        workbook.initialize(resolution.seed.as_deref());
        workbook.storage_mut().mark_ready();
        storage::publish(map.as_ref(), workbook.storage_mut().take_pending());

        let workbook = Arc::new(Mutex::new(workbook));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let router = map.observe(
            VALUE_CHANGED,
            router(Arc::downgrade(&map), Arc::downgrade(&workbook), faults.clone()),
        );

        Ok(SharedWorkbook {
            map,
            workbook,
            writer: ReentrantMutex::new(()),
            dimensions,
            faults,
            _router: router,
        })
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn state(&self) -> AdapterState {
        self.workbook.lock().storage().state()
    }

    /// The underlying store.
    pub fn map(&self) -> &Arc<M> {
        &self.map
    }

    /// Edit a cell locally; the new text is written to the store.
    pub fn set_cell_text(&self, row: usize, col: usize, text: &str) -> Result<()> {
        let _ordered = self.writer.lock();
        let writes = {
            let mut workbook = self.workbook.lock();
            workbook.set_cell_text(row, col, text, EditOrigin::Local)?;
            workbook.storage_mut().take_pending()
        };
        storage::publish(self.map.as_ref(), writes);
        Ok(())
    }

    /// Raw text currently held by the local workbook.
    pub fn cell_text(&self, row: usize, col: usize) -> Result<String> {
        Ok(self.workbook.lock().cell_text(row, col)?)
    }

    /// Raw text currently in the store; "" when the key is absent.
    pub fn load_cell_text(&self, row: usize, col: usize) -> Result<String> {
        Ok(self.workbook.lock().load_cell_text(row, col)?)
    }

    /// Computed value of a cell.
    pub fn display(&self, row: usize, col: usize) -> Result<String> {
        Ok(self.workbook.lock().display(row, col)?)
    }

    pub fn snapshot(&self) -> Vec<Vec<String>> {
        self.workbook.lock().snapshot()
    }

    pub fn display_grid(&self) -> Vec<Vec<String>> {
        self.workbook.lock().display_grid()
    }

    /// Number of edits the local workbook has applied.
    pub fn revision(&self) -> u64 {
        self.workbook.lock().revision()
    }

    /// Apply the store's current value for `key` as a remote edit.
    ///
    /// This is what the change listener runs for every notification from
    /// another participant. Dimension keys are ignored.
    pub fn apply_remote_change(&self, key: &str) -> Result<()> {
        route_change(self.map.as_ref(), &self.workbook, key)
    }

    /// Listen for any named event on the underlying store.
    pub fn observe(&self, event: &str, listener: Listener) -> Subscription {
        self.map.observe(event, listener)
    }

    /// Errors raised while applying remote changes since the last call.
    pub fn take_faults(&self) -> Vec<SyncError> {
        std::mem::take(&mut *self.faults.lock())
    }
}

fn router<M: SharedMap + 'static>(
    map: Weak<M>,
    workbook: Weak<Mutex<Engine<M>>>,
    faults: Arc<Mutex<Vec<SyncError>>>,
) -> Listener {
    Arc::new(move |event: &MapEvent| {
        // Echo of a write this workbook just made; it is already current.
        if event.local {
            return;
        }
        let Some(key) = event.key.as_deref() else {
            return;
        };
        let (Some(map), Some(workbook)) = (map.upgrade(), workbook.upgrade()) else {
            return;
        };
        if let Err(err) = route_change(map.as_ref(), &workbook, key) {
            error!(key, %err, "remote change not applied");
            faults.lock().push(err);
        }
    })
}

fn route_change<M: SharedMap>(map: &M, workbook: &Mutex<Engine<M>>, key: &str) -> Result<()> {
    match StoreKey::parse(key)? {
        StoreKey::NumRows | StoreKey::NumCols => {
            warn!(key, "ignoring remote change to grid dimensions");
            Ok(())
        }
        StoreKey::Cell(cell) => {
            let text = map.get(key).map(|v| v.to_text()).unwrap_or_default();
            workbook
                .lock()
                .set_cell_text(cell.row, cell.col, &text, EditOrigin::Remote)?;
            debug!(key, "remote change applied");
            Ok(())
        }
    }
}
