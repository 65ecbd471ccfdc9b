//! Fixed-size workbook over pluggable cell storage.
//!
//! The workbook owns the in-memory grid and evaluates formulas, but it does
//! not decide where cell text lives. Every local edit is handed to a
//! [`CellStorage`] implementation, which may persist it, replicate it, or
//! drop it. Edits that arrive from elsewhere are applied with
//! [`EditOrigin::Remote`] and never reach the storage hook again.

use rhai::Engine;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::trace;

use crate::engine::{
    Cell, CellRef, CellType, Grid, ValueCache, create_engine, detect_cycle, eval_formula,
    format_dynamic, format_number,
};

/// Storage hooks the workbook calls to read and persist raw cell text.
pub trait CellStorage {
    /// Raw text stored for a cell; empty when nothing was stored.
    fn load_cell_text(&self, row: usize, col: usize) -> String;

    /// Persist raw text for a cell after a local edit.
    fn store_cell_text(&mut self, row: usize, col: usize, text: &str);
}

/// Where an edit came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOrigin {
    /// Made by this participant; written through to storage.
    Local,
    /// Observed from another participant; applied in memory only.
    Remote,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkbookError {
    #[error("cell ({row}, {col}) is outside the {num_rows}x{num_cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        num_rows: usize,
        num_cols: usize,
    },
}

/// A spreadsheet with fixed dimensions, formula evaluation and storage hooks.
pub struct Workbook<S> {
    num_rows: usize,
    num_cols: usize,
    /// Sparse cell grid, shared with the Rhai built-ins.
    grid: Grid,
    /// Computed formula results, shared with the Rhai built-ins.
    value_cache: ValueCache,
    engine: Engine,
    /// Reverse dependency map: cell -> cells whose formulas read it
    dependents: HashMap<CellRef, HashSet<CellRef>>,
    storage: S,
    revision: u64,
}

impl<S: CellStorage> Workbook<S> {
    /// Create an empty workbook. Nothing is written to storage until
    /// [`Workbook::initialize`] or an edit.
    pub fn new(num_rows: usize, num_cols: usize, storage: S) -> Self {
        let grid = Grid::default();
        let value_cache = ValueCache::default();
        let engine = create_engine(grid.clone(), value_cache.clone());
        Workbook {
            num_rows,
            num_cols,
            grid,
            value_cache,
            engine,
            dependents: HashMap::new(),
            storage,
            revision: 0,
        }
    }

    /// Seed the grid from a jagged row-major array of raw text.
    ///
    /// Every seeded cell inside the grid is applied as a local edit, so it is
    /// replayed through [`CellStorage::store_cell_text`]. Seed entries past
    /// the grid edge are ignored; cells the seed does not cover stay empty.
    pub fn initialize(&mut self, seed: Option<&[Vec<String>]>) {
        self.grid.clear();
        self.value_cache.clear();
        self.dependents.clear();

        let Some(seed) = seed else {
            return;
        };
        for (row, cells) in seed.iter().take(self.num_rows).enumerate() {
            for (col, text) in cells.iter().take(self.num_cols).enumerate() {
                self.apply(CellRef::new(row, col), text, EditOrigin::Local);
            }
        }
    }

    /// Replace the raw text of a cell.
    ///
    /// A local edit is written through storage exactly once; a remote edit
    /// only updates the in-memory grid.
    pub fn set_cell_text(
        &mut self,
        row: usize,
        col: usize,
        text: &str,
        origin: EditOrigin,
    ) -> Result<(), WorkbookError> {
        let at = self.check_bounds(row, col)?;
        self.apply(at, text, origin);
        Ok(())
    }

    fn apply(&mut self, at: CellRef, text: &str, origin: EditOrigin) {
        let cell = Cell::from_text(text);

        if let Some((_, old)) = self.grid.remove(&at) {
            for dep in &old.depends_on {
                if let Some(readers) = self.dependents.get_mut(dep) {
                    readers.remove(&at);
                }
            }
        }
        for dep in &cell.depends_on {
            self.dependents.entry(*dep).or_default().insert(at);
        }
        if !text.is_empty() {
            self.grid.insert(at, cell);
        }

        self.mark_dirty(at);
        self.revision += 1;
        trace!(row = at.row, col = at.col, ?origin, "cell text applied");

        if origin == EditOrigin::Local {
            self.storage.store_cell_text(at.row, at.col, text);
        }
    }

    /// Mark a cell and everything that transitively reads it as dirty.
    fn mark_dirty(&mut self, changed: CellRef) {
        let mut to_process = vec![changed];
        let mut visited = HashSet::new();
        while let Some(at) = to_process.pop() {
            if !visited.insert(at) {
                continue;
            }
            self.value_cache.remove(&at);
            if let Some(mut cell) = self.grid.get_mut(&at) {
                let is_script = cell.is_script();
                cell.dirty = is_script;
                cell.cached_value = None;
            }
            if let Some(readers) = self.dependents.get(&at) {
                to_process.extend(readers.iter().copied());
            }
        }
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<CellRef, WorkbookError> {
        if row < self.num_rows && col < self.num_cols {
            Ok(CellRef::new(row, col))
        } else {
            Err(WorkbookError::OutOfBounds {
                row,
                col,
                num_rows: self.num_rows,
                num_cols: self.num_cols,
            })
        }
    }

    /// Raw text held in memory for a cell ("" when empty).
    pub fn cell_text(&self, row: usize, col: usize) -> Result<String, WorkbookError> {
        let at = self.check_bounds(row, col)?;
        Ok(self
            .grid
            .get(&at)
            .map(|cell| cell.text.clone())
            .unwrap_or_default())
    }

    /// Raw text for a cell as reported by the storage hook.
    pub fn load_cell_text(&self, row: usize, col: usize) -> Result<String, WorkbookError> {
        let at = self.check_bounds(row, col)?;
        Ok(self.storage.load_cell_text(at.row, at.col))
    }

    /// Computed display value for a cell.
    ///
    /// Formulas are evaluated lazily and cached until one of their inputs
    /// changes. Cycles display as `#CYCLE!`, evaluation errors as `#ERR!`.
    pub fn display(&mut self, row: usize, col: usize) -> Result<String, WorkbookError> {
        let at = self.check_bounds(row, col)?;
        let Some(cell) = self.grid.get(&at) else {
            return Ok(String::new());
        };

        let formula = match &cell.contents {
            CellType::Empty => return Ok(String::new()),
            CellType::Text(s) => return Ok(s.clone()),
            CellType::Number(n) => return Ok(format_number(*n)),
            CellType::Script(s) => {
                if !cell.dirty
                    && let Some(cached) = &cell.cached_value
                {
                    return Ok(cached.clone());
                }
                s.clone()
            }
        };
        drop(cell);

        if detect_cycle(&at, &self.grid).is_some() {
            return Ok("#CYCLE!".to_string());
        }

        let display = match eval_formula(&self.engine, &formula) {
            Ok(result) => {
                let display = format_dynamic(&result);
                self.value_cache.insert(at, result);
                display
            }
            Err(err) => {
                trace!(row, col, %err, "formula evaluation failed");
                "#ERR!".to_string()
            }
        };
        if let Some(mut cell) = self.grid.get_mut(&at) {
            cell.cached_value = Some(display.clone());
            cell.dirty = false;
        }
        Ok(display)
    }

    /// Raw text of every cell, row-major.
    pub fn snapshot(&self) -> Vec<Vec<String>> {
        (0..self.num_rows)
            .map(|row| {
                (0..self.num_cols)
                    .map(|col| {
                        self.grid
                            .get(&CellRef::new(row, col))
                            .map(|cell| cell.text.clone())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Computed display value of every cell, row-major.
    pub fn display_grid(&mut self) -> Vec<Vec<String>> {
        let (num_rows, num_cols) = (self.num_rows, self.num_cols);
        let mut out = Vec::with_capacity(num_rows);
        for row in 0..num_rows {
            let mut cells = Vec::with_capacity(num_cols);
            for col in 0..num_cols {
                cells.push(self.display(row, col).unwrap_or_default());
            }
            out.push(cells);
        }
        out
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Number of cell edits applied so far, local and remote.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingStorage {
        cells: HashMap<(usize, usize), String>,
        writes: Vec<(usize, usize, String)>,
    }

    impl CellStorage for RecordingStorage {
        fn load_cell_text(&self, row: usize, col: usize) -> String {
            self.cells.get(&(row, col)).cloned().unwrap_or_default()
        }

        fn store_cell_text(&mut self, row: usize, col: usize, text: &str) {
            self.cells.insert((row, col), text.to_string());
            self.writes.push((row, col, text.to_string()));
        }
    }

    fn seed(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_initialize_replays_seed_through_storage() {
        let mut wb = Workbook::new(2, 2, RecordingStorage::default());
        wb.initialize(Some(&seed(&[&["a", "b"], &["c"]])));

        assert_eq!(
            wb.storage().writes,
            vec![
                (0, 0, "a".to_string()),
                (0, 1, "b".to_string()),
                (1, 0, "c".to_string()),
            ]
        );
        assert_eq!(wb.cell_text(1, 1).unwrap(), "");
    }

    #[test]
    fn test_initialize_ignores_seed_outside_grid() {
        let mut wb = Workbook::new(1, 1, RecordingStorage::default());
        wb.initialize(Some(&seed(&[&["a", "b"], &["c", "d"]])));
        assert_eq!(wb.storage().writes.len(), 1);
        assert_eq!(wb.snapshot(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_remote_edit_skips_storage() {
        let mut wb = Workbook::new(2, 2, RecordingStorage::default());
        wb.set_cell_text(0, 0, "5", EditOrigin::Remote).unwrap();
        assert!(wb.storage().writes.is_empty());
        assert_eq!(wb.cell_text(0, 0).unwrap(), "5");
        assert_eq!(wb.revision(), 1);
    }

    #[test]
    fn test_local_edit_writes_exactly_once() {
        let mut wb = Workbook::new(2, 2, RecordingStorage::default());
        wb.set_cell_text(1, 0, "hello", EditOrigin::Local).unwrap();
        assert_eq!(wb.storage().writes, vec![(1, 0, "hello".to_string())]);
        assert_eq!(wb.load_cell_text(1, 0).unwrap(), "hello");
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let mut wb = Workbook::new(2, 3, RecordingStorage::default());
        let err = wb.set_cell_text(2, 0, "x", EditOrigin::Local).unwrap_err();
        assert_eq!(
            err,
            WorkbookError::OutOfBounds {
                row: 2,
                col: 0,
                num_rows: 2,
                num_cols: 3
            }
        );
        assert!(wb.storage().writes.is_empty());
        assert_eq!(wb.revision(), 0);
    }

    #[test]
    fn test_display_evaluates_formulas() {
        let mut wb = Workbook::new(3, 3, RecordingStorage::default());
        wb.set_cell_text(0, 0, "10", EditOrigin::Local).unwrap();
        wb.set_cell_text(0, 1, "32", EditOrigin::Local).unwrap();
        wb.set_cell_text(0, 2, "=A1 + B1", EditOrigin::Local).unwrap();
        wb.set_cell_text(1, 0, "=SUM(A1:C1)", EditOrigin::Local).unwrap();

        assert_eq!(wb.display(0, 2).unwrap(), "42");
        assert_eq!(wb.display(1, 0).unwrap(), "84");
    }

    #[test]
    fn test_dependent_recomputes_after_remote_edit() {
        let mut wb = Workbook::new(2, 2, RecordingStorage::default());
        wb.set_cell_text(0, 0, "2", EditOrigin::Local).unwrap();
        wb.set_cell_text(0, 1, "=A1 * 3", EditOrigin::Local).unwrap();
        assert_eq!(wb.display(0, 1).unwrap(), "6");

        wb.set_cell_text(0, 0, "5", EditOrigin::Remote).unwrap();
        assert_eq!(wb.display(0, 1).unwrap(), "15");
    }

    #[test]
    fn test_cycle_and_error_display() {
        let mut wb = Workbook::new(2, 2, RecordingStorage::default());
        wb.set_cell_text(0, 0, "=B1", EditOrigin::Local).unwrap();
        wb.set_cell_text(0, 1, "=A1", EditOrigin::Local).unwrap();
        wb.set_cell_text(1, 0, "=undefined_fn()", EditOrigin::Local).unwrap();

        assert_eq!(wb.display(0, 0).unwrap(), "#CYCLE!");
        assert_eq!(wb.display(1, 0).unwrap(), "#ERR!");
    }

    #[test]
    fn test_clearing_a_cell_removes_it() {
        let mut wb = Workbook::new(1, 1, RecordingStorage::default());
        wb.set_cell_text(0, 0, "x", EditOrigin::Local).unwrap();
        wb.set_cell_text(0, 0, "", EditOrigin::Local).unwrap();
        assert_eq!(wb.cell_text(0, 0).unwrap(), "");
        assert_eq!(wb.display(0, 0).unwrap(), "");
        assert_eq!(wb.storage().load_cell_text(0, 0), "");
    }
}
