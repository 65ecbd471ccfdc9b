//! Gridsync core: workbooks kept in step through a replicated map.

pub mod error;
pub mod export;
pub mod key;
pub mod map;
pub mod session;
pub mod workbook;

pub use error::{Result, SyncError};
pub use key::{CellKey, StoreKey};
pub use map::{Network, Replica, SharedMap, Value};
pub use session::{Session, SessionOptions, Step, parse_script};
pub use workbook::{AdapterState, GridDimensions, MAX_CELLS, SharedWorkbook};
