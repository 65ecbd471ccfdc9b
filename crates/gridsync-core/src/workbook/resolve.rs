//! Decide a workbook's dimensions and initial content when it attaches to a
//! store that may already hold another participant's grid.

use tracing::info;

use crate::error::{Result, SyncError};
use crate::key::{CellKey, NUM_COLS_KEY, NUM_ROWS_KEY};
use crate::map::{SharedMap, Value};

/// Largest grid, in cells, a workbook will attach to or create.
pub const MAX_CELLS: usize = 1 << 24;

/// Grid shape shared by every participant of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub num_rows: usize,
    pub num_cols: usize,
}

impl GridDimensions {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        GridDimensions { num_rows, num_cols }
    }

    /// Total cell count, if it is within [`MAX_CELLS`].
    pub fn cell_count(&self) -> Option<usize> {
        self.num_rows
            .checked_mul(self.num_cols)
            .filter(|&cells| cells <= MAX_CELLS)
    }
}

/// Outcome of attaching to a store.
pub(crate) struct Resolution {
    pub dimensions: GridDimensions,
    /// True when the store already carried dimension metadata.
    pub existing: bool,
    pub seed: Option<Vec<Vec<String>>>,
}

/// Resolve authoritative dimensions and seed content.
///
/// - Both metadata keys present: the store wins. Requested dimensions and
///   `init` are discarded and the seed is read back from the store in
///   row-major order, missing cells reading as "".
/// - Neither present: the requested dimensions are written to the store and
///   `init` becomes the seed.
/// - Only one present: the store is inconsistent and attaching fails.
///
/// Grids over [`MAX_CELLS`] are refused either way, before anything is
/// read or written.
pub(crate) fn resolve<M: SharedMap>(
    map: &M,
    requested: GridDimensions,
    init: Option<Vec<Vec<String>>>,
) -> Result<Resolution> {
    match (map.get(NUM_ROWS_KEY), map.get(NUM_COLS_KEY)) {
        (Some(rows), Some(cols)) => {
            let dimensions = GridDimensions::new(
                metadata_count(NUM_ROWS_KEY, &rows)?,
                metadata_count(NUM_COLS_KEY, &cols)?,
            );
            if dimensions.cell_count().is_none() {
                return Err(SyncError::InvalidMetadata {
                    key: NUM_ROWS_KEY,
                    value: format!("{} x {} cells", rows, cols),
                });
            }
            info!(
                rows = dimensions.num_rows,
                cols = dimensions.num_cols,
                "attaching to existing grid"
            );
            Ok(Resolution {
                dimensions,
                existing: true,
                seed: Some(read_grid(map, dimensions)),
            })
        }
        (None, None) => {
            if requested.cell_count().is_none() {
                return Err(SyncError::GridTooLarge {
                    num_rows: requested.num_rows,
                    num_cols: requested.num_cols,
                    max_cells: MAX_CELLS,
                });
            }
            map.set(NUM_ROWS_KEY, Value::from(requested.num_rows));
            map.set(NUM_COLS_KEY, Value::from(requested.num_cols));
            info!(
                rows = requested.num_rows,
                cols = requested.num_cols,
                "created new grid"
            );
            Ok(Resolution {
                dimensions: requested,
                existing: false,
                seed: init,
            })
        }
        (Some(_), None) => Err(SyncError::DimensionMismatch {
            present: NUM_ROWS_KEY,
            missing: NUM_COLS_KEY,
        }),
        (None, Some(_)) => Err(SyncError::DimensionMismatch {
            present: NUM_COLS_KEY,
            missing: NUM_ROWS_KEY,
        }),
    }
}

fn metadata_count(key: &'static str, value: &Value) -> Result<usize> {
    value.as_count().ok_or_else(|| SyncError::InvalidMetadata {
        key,
        value: value.to_string(),
    })
}

fn read_grid<M: SharedMap>(map: &M, dimensions: GridDimensions) -> Vec<Vec<String>> {
    (0..dimensions.num_rows)
        .map(|row| {
            (0..dimensions.num_cols)
                .map(|col| {
                    map.get(&CellKey::encode(row, col))
                        .map(|v| v.to_text())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Network;

    #[test]
    fn test_fresh_store_takes_requested_dimensions() {
        let net = Network::new();
        let map = net.join();
        let init = vec![vec!["a".to_string()]];

        let res = resolve(map.as_ref(), GridDimensions::new(3, 4), Some(init.clone())).unwrap();
        assert!(!res.existing);
        assert_eq!(res.dimensions, GridDimensions::new(3, 4));
        assert_eq!(res.seed, Some(init));
        assert_eq!(map.get(NUM_ROWS_KEY), Some(Value::Int(3)));
        assert_eq!(map.get(NUM_COLS_KEY), Some(Value::Int(4)));
    }

    #[test]
    fn test_existing_store_wins_and_fills_gaps() {
        let net = Network::new();
        let map = net.join();
        map.set(NUM_ROWS_KEY, Value::Int(2));
        map.set(NUM_COLS_KEY, Value::Int(1));
        map.set("1,0", Value::from("z"));

        let res = resolve(map.as_ref(), GridDimensions::new(9, 9), None).unwrap();
        assert!(res.existing);
        assert_eq!(res.dimensions, GridDimensions::new(2, 1));
        assert_eq!(
            res.seed,
            Some(vec![vec![String::new()], vec!["z".to_string()]])
        );
    }

    #[test]
    fn test_partial_metadata_is_rejected() {
        let net = Network::new();
        let map = net.join();
        map.set(NUM_COLS_KEY, Value::Int(2));

        let err = resolve(map.as_ref(), GridDimensions::new(1, 1), None)
            .err()
            .unwrap();
        assert_eq!(
            err,
            SyncError::DimensionMismatch {
                present: NUM_COLS_KEY,
                missing: NUM_ROWS_KEY
            }
        );
        assert_eq!(map.get(NUM_ROWS_KEY), None);
    }

    #[test]
    fn test_oversized_store_grid_is_rejected() {
        let net = Network::new();
        let map = net.join();
        map.set(NUM_ROWS_KEY, Value::Int(i64::MAX));
        map.set(NUM_COLS_KEY, Value::Int(1));

        assert!(matches!(
            resolve(map.as_ref(), GridDimensions::new(1, 1), None),
            Err(SyncError::InvalidMetadata { key: NUM_ROWS_KEY, .. })
        ));
    }

    #[test]
    fn test_oversized_request_is_rejected_without_writing() {
        let net = Network::new();
        let map = net.join();

        let err = resolve(map.as_ref(), GridDimensions::new(MAX_CELLS, 2), None)
            .err()
            .unwrap();
        assert_eq!(
            err,
            SyncError::GridTooLarge {
                num_rows: MAX_CELLS,
                num_cols: 2,
                max_cells: MAX_CELLS
            }
        );
        assert!(map.keys().is_empty());
    }

    #[test]
    fn test_grid_at_the_cap_is_accepted() {
        assert_eq!(
            GridDimensions::new(MAX_CELLS, 1).cell_count(),
            Some(MAX_CELLS)
        );
        assert_eq!(GridDimensions::new(usize::MAX, 2).cell_count(), None);
    }

    #[test]
    fn test_non_numeric_metadata_is_rejected() {
        let net = Network::new();
        let map = net.join();
        map.set(NUM_ROWS_KEY, Value::from("two"));
        map.set(NUM_COLS_KEY, Value::Int(2));

        assert!(matches!(
            resolve(map.as_ref(), GridDimensions::new(1, 1), None),
            Err(SyncError::InvalidMetadata { key: NUM_ROWS_KEY, .. })
        ));
    }
}
