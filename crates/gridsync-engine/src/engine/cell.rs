//! Cell data structures for the workbook grid.
//!
//! - [`CellType`] - The parsed content of a cell (empty, text, number, or formula)
//! - [`Cell`] - A cell with its raw text, dependencies and cached evaluation state
//! - [`Grid`] - Thread-safe sparse storage for cells (backed by `DashMap`)
//! - [`ValueCache`] - Computed formula values shared with the Rhai built-ins

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cell_ref::CellRef;
use super::deps::extract_dependencies;

/// The type of content stored in a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    Empty,
    Text(String),
    Number(f64),
    Script(String),
}

/// A cell in the workbook grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    /// Raw text exactly as entered or replicated. This is what the storage
    /// hooks see; `contents` is derived from it.
    pub text: String,
    pub contents: CellType,
    pub depends_on: Vec<CellRef>,
    pub dirty: bool,
    /// Cached display string for script cells (not serialized).
    #[serde(skip)]
    pub cached_value: Option<String>,
}

impl Cell {
    /// Parse raw cell text.
    /// - Empty string or whitespace -> Empty
    /// - Starts with '=' -> Script (without the '=')
    /// - Quoted string -> Text (without quotes)
    /// - Valid number -> Number
    /// - Otherwise -> Text
    pub fn from_text(text: &str) -> Cell {
        let trimmed = text.trim();
        let contents = if trimmed.is_empty() {
            CellType::Empty
        } else if let Some(formula) = trimmed.strip_prefix('=') {
            CellType::Script(formula.to_string())
        } else if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            CellType::Text(trimmed[1..trimmed.len() - 1].to_string())
        } else if let Ok(n) = trimmed.parse::<f64>() {
            CellType::Number(n)
        } else {
            CellType::Text(trimmed.to_string())
        };

        let (depends_on, dirty) = match &contents {
            CellType::Script(s) => (extract_dependencies(s), true),
            _ => (Vec::new(), false),
        };

        Cell {
            text: text.to_string(),
            contents,
            depends_on,
            dirty,
            cached_value: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.contents, CellType::Empty)
    }

    pub fn is_script(&self) -> bool {
        matches!(self.contents, CellType::Script(_))
    }
}

/// Thread-safe sparse grid storage.
pub type Grid = Arc<DashMap<CellRef, Cell>>;

/// Thread-safe cache for computed formula values, keyed by position.
/// Lets cell references reuse already-evaluated results.
pub type ValueCache = Arc<DashMap<CellRef, rhai::Dynamic>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_keeps_raw_text() {
        let cell = Cell::from_text(" 1.50 ");
        assert_eq!(cell.text, " 1.50 ");
        assert_eq!(cell.contents, CellType::Number(1.5));
    }

    #[test]
    fn test_from_text_script_extracts_dependencies() {
        let cell = Cell::from_text("=A1 + B2");
        assert!(cell.is_script());
        assert!(cell.dirty);
        assert_eq!(
            cell.depends_on,
            vec![CellRef::new(0, 0), CellRef::new(1, 1)]
        );
    }

    #[test]
    fn test_from_text_quoted_number_is_text() {
        let cell = Cell::from_text("\"42\"");
        assert_eq!(cell.contents, CellType::Text("42".to_string()));
    }

    #[test]
    fn test_from_text_blank_is_empty() {
        assert!(Cell::from_text("   ").is_empty());
        assert!(Cell::from_text("").is_empty());
    }
}
