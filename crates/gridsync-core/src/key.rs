//! Store key encoding.
//!
//! Cells live in the flat store under `"<row>,<col>"` (canonical decimal, no
//! padding); grid dimensions live under the reserved keys `"numRows"` and
//! `"numCols"`. The format is shared by every participant and must stay
//! bit-exact.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Result, SyncError};

pub const NUM_ROWS_KEY: &str = "numRows";
pub const NUM_COLS_KEY: &str = "numCols";

/// Address of a cell in the store key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row: usize,
    pub col: usize,
}

impl CellKey {
    pub fn new(row: usize, col: usize) -> Self {
        CellKey { row, col }
    }

    /// Store key for `(row, col)`.
    pub fn encode(row: usize, col: usize) -> String {
        CellKey::new(row, col).to_string()
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// A decoded store key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKey {
    NumRows,
    NumCols,
    Cell(CellKey),
}

fn cell_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<row>0|[1-9][0-9]*),(?<col>0|[1-9][0-9]*)$")
            .expect("cell key regex must compile")
    })
}

impl StoreKey {
    /// Decode a store key. Reserved metadata keys are matched before any
    /// coordinate parsing; anything else must be a canonical cell key.
    pub fn parse(key: &str) -> Result<StoreKey> {
        match key {
            NUM_ROWS_KEY => return Ok(StoreKey::NumRows),
            NUM_COLS_KEY => return Ok(StoreKey::NumCols),
            _ => {}
        }

        let malformed = || SyncError::MalformedKey {
            key: key.to_string(),
        };
        let caps = cell_key_re().captures(key).ok_or_else(malformed)?;
        let row = caps["row"].parse::<usize>().map_err(|_| malformed())?;
        let col = caps["col"].parse::<usize>().map_err(|_| malformed())?;
        Ok(StoreKey::Cell(CellKey::new(row, col)))
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, StoreKey::NumRows | StoreKey::NumCols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_is_plain_decimal() {
        assert_eq!(CellKey::encode(0, 0), "0,0");
        assert_eq!(CellKey::encode(12, 305), "12,305");
    }

    #[test]
    fn test_parse_metadata_keys() {
        assert_eq!(StoreKey::parse("numRows").unwrap(), StoreKey::NumRows);
        assert_eq!(StoreKey::parse("numCols").unwrap(), StoreKey::NumCols);
        assert!(StoreKey::parse("numRows").unwrap().is_metadata());
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        for key in [
            "", ",", "1,", ",1", "01,2", "1,02", "-1,2", "1,2,3", " 1,2", "1, 2", "1;2", "a,b",
            "NUMROWS", "99999999999999999999999,0",
        ] {
            assert_eq!(
                StoreKey::parse(key),
                Err(SyncError::MalformedKey {
                    key: key.to_string()
                }),
                "key {:?} should be rejected",
                key
            );
        }
    }

    proptest! {
        #[test]
        fn key_round_trip(row in any::<usize>(), col in any::<usize>()) {
            let key = CellKey::encode(row, col);
            prop_assert_eq!(StoreKey::parse(&key).unwrap(), StoreKey::Cell(CellKey::new(row, col)));
        }

        #[test]
        fn distinct_cells_never_collide(
            a in (0usize..10_000, 0usize..10_000),
            b in (0usize..10_000, 0usize..10_000),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(CellKey::encode(a.0, a.1), CellKey::encode(b.0, b.1));
        }
    }
}
