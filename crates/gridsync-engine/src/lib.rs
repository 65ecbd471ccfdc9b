//! gridsync_engine - Fixed-size spreadsheet engine with Rhai formulas and
//! pluggable cell storage hooks.

pub(crate) mod builtins;
pub mod engine;
pub mod workbook;

pub use workbook::{CellStorage, EditOrigin, Workbook, WorkbookError};
