//! Built-in spreadsheet functions (Rust) and their names.
//!
//! Conventions:
//! - Spreadsheet-facing built-in names are ALL CAPS (e.g. `SUM`, `AVG`).
//! - Range built-ins rewrite to ALLCAPS Rhai function names (e.g. `SUM_RANGE`)
//!   taking `(r1, c1, r2, c2)`.
//! - If you add a new range built-in, update `RANGE_BUILTINS` and register its
//!   implementation in `register_builtins`.

use crate::engine::{CellRef, CellType, Grid, ValueCache, preprocess_script};
use regex::Regex;
use rhai::{Dynamic, Engine, EvalAltResult, NativeCallContext, Position};

use std::sync::OnceLock;

pub struct RangeBuiltin {
    pub sheet_name: &'static str,
    pub rhai_name: &'static str,
}

pub const RANGE_BUILTINS: &[RangeBuiltin] = &[
    RangeBuiltin {
        sheet_name: "SUM",
        rhai_name: "SUM_RANGE",
    },
    RangeBuiltin {
        sheet_name: "AVG",
        rhai_name: "AVG_RANGE",
    },
    RangeBuiltin {
        sheet_name: "COUNT",
        rhai_name: "COUNT_RANGE",
    },
    RangeBuiltin {
        sheet_name: "MIN",
        rhai_name: "MIN_RANGE",
    },
    RangeBuiltin {
        sheet_name: "MAX",
        rhai_name: "MAX_RANGE",
    },
];

/// Regex that matches built-in range calls like `SUM(A1:B5)`.
///
/// Captures:
/// - group 1: function name (e.g. `SUM`)
/// - group 2: start cell ref (e.g. `A1`)
/// - group 3: end cell ref (e.g. `B5`)
pub fn range_fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = RANGE_BUILTINS
            .iter()
            .map(|b| b.sheet_name)
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r"\b({})\(\s*([A-Za-z]+[0-9]+)\s*:\s*([A-Za-z]+[0-9]+)\s*\)",
            names
        ))
        .expect("built-in range regex must compile")
    })
}

pub fn range_rhai_name(sheet_name: &str) -> Option<&'static str> {
    RANGE_BUILTINS
        .iter()
        .find(|b| b.sheet_name == sheet_name)
        .map(|b| b.rhai_name)
}

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn to_index(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Inclusive, normalised bounds of a range. Negative corners yield `None`.
fn range_bounds(r1: i64, c1: i64, r2: i64, c2: i64) -> Option<(usize, usize, usize, usize)> {
    let (r1, c1, r2, c2) = (to_index(r1)?, to_index(c1)?, to_index(r2)?, to_index(c2)?);
    Some((r1.min(r2), c1.min(c2), r1.max(r2), c1.max(c2)))
}

fn eval_script_cell(ctx: &NativeCallContext, script: &str) -> Dynamic {
    ctx.engine()
        .eval::<Dynamic>(&preprocess_script(script))
        .unwrap_or(Dynamic::UNIT)
}

fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(n) = value.as_float() {
        return Some(n);
    }
    value.as_int().ok().map(|n| n as f64)
}

/// Typed value at a cell: cache first, then the grid.
fn typed_value(ctx: &NativeCallContext, grid: &Grid, cache: &ValueCache, at: CellRef) -> Dynamic {
    if let Some(cached) = cache.get(&at) {
        return cached.clone();
    }
    let Some(entry) = grid.get(&at) else {
        return Dynamic::from(String::new());
    };
    match &entry.contents {
        CellType::Empty => Dynamic::from(String::new()),
        CellType::Number(n) => Dynamic::from(*n),
        CellType::Text(s) => Dynamic::from(s.clone()),
        CellType::Script(s) => {
            let script = s.clone();
            drop(entry);
            eval_script_cell(ctx, &script)
        }
    }
}

/// Numeric value at a cell; empty cells are zero, text is NaN.
fn numeric_value(ctx: &NativeCallContext, grid: &Grid, cache: &ValueCache, at: CellRef) -> f64 {
    if let Some(entry) = grid.get(&at)
        && matches!(entry.contents, CellType::Text(_))
    {
        return f64::NAN;
    }
    let value = typed_value(ctx, grid, cache, at);
    if value.clone().into_string().is_ok_and(|s| s.is_empty()) {
        return 0.0;
    }
    as_number(&value).unwrap_or(f64::NAN)
}

/// Numeric values of every cell in a range, skipping non-numbers.
fn range_numbers(
    ctx: &NativeCallContext,
    grid: &Grid,
    cache: &ValueCache,
    bounds: (usize, usize, usize, usize),
) -> Vec<f64> {
    let (min_row, min_col, max_row, max_col) = bounds;
    let mut values = Vec::new();
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            let at = CellRef::new(row, col);
            if grid.get(&at).is_none_or(|c| c.is_empty()) && !cache.contains_key(&at) {
                continue;
            }
            let n = numeric_value(ctx, grid, cache, at);
            if !n.is_nan() {
                values.push(n);
            }
        }
    }
    values
}

fn register_range_fn<F>(engine: &mut Engine, name: &str, grid: &Grid, cache: &ValueCache, reduce: F)
where
    F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
{
    let grid = grid.clone();
    let cache = cache.clone();
    engine.register_fn(
        name,
        move |ctx: NativeCallContext,
              r1: i64,
              c1: i64,
              r2: i64,
              c2: i64|
              -> Result<f64, Box<EvalAltResult>> {
            let bounds = range_bounds(r1, c1, r2, c2)
                .ok_or_else(|| invalid_arg("range corners must be >= 0"))?;
            Ok(reduce(&range_numbers(&ctx, &grid, &cache, bounds)))
        },
    );
}

/// Register all built-in functions into the Rhai engine.
pub fn register_builtins(engine: &mut Engine, grid: Grid, value_cache: ValueCache) {
    // CELL(row, col): numeric value at cell (text -> NaN, empty -> 0)
    let grid_cell = grid.clone();
    let cache_cell = value_cache.clone();
    engine.register_fn(
        "CELL",
        move |ctx: NativeCallContext, row: i64, col: i64| -> f64 {
            match (to_index(row), to_index(col)) {
                (Some(row), Some(col)) => {
                    numeric_value(&ctx, &grid_cell, &cache_cell, CellRef::new(row, col))
                }
                _ => f64::NAN,
            }
        },
    );

    // VALUE(row, col): typed value; empty cells are "" so `len(@A1)` works.
    let grid_value = grid.clone();
    let cache_value = value_cache.clone();
    engine.register_fn(
        "VALUE",
        move |ctx: NativeCallContext, row: i64, col: i64| -> Dynamic {
            match (to_index(row), to_index(col)) {
                (Some(row), Some(col)) => {
                    typed_value(&ctx, &grid_value, &cache_value, CellRef::new(row, col))
                }
                _ => Dynamic::UNIT,
            }
        },
    );

    register_range_fn(engine, "SUM_RANGE", &grid, &value_cache, |v| v.iter().sum());
    register_range_fn(engine, "AVG_RANGE", &grid, &value_cache, |v| {
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f64>() / v.len() as f64
        }
    });
    register_range_fn(engine, "MIN_RANGE", &grid, &value_cache, |v| {
        v.iter().copied().reduce(f64::min).unwrap_or(0.0)
    });
    register_range_fn(engine, "MAX_RANGE", &grid, &value_cache, |v| {
        v.iter().copied().reduce(f64::max).unwrap_or(0.0)
    });

    // COUNT_RANGE(r1, c1, r2, c2): count non-empty cells, text included
    let grid_count = grid.clone();
    let cache_count = value_cache.clone();
    engine.register_fn(
        "COUNT_RANGE",
        move |r1: i64, c1: i64, r2: i64, c2: i64| -> Result<f64, Box<EvalAltResult>> {
            let (min_row, min_col, max_row, max_col) = range_bounds(r1, c1, r2, c2)
                .ok_or_else(|| invalid_arg("range corners must be >= 0"))?;
            let mut count = 0;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    let at = CellRef::new(row, col);
                    if cache_count.contains_key(&at)
                        || grid_count.get(&at).is_some_and(|c| !c.is_empty())
                    {
                        count += 1;
                    }
                }
            }
            Ok(count as f64)
        },
    );

    // POW(base, exp): Rhai has no float pow, and cell values can be int or float
    engine.register_fn("POW", |base: f64, exp: f64| -> f64 { base.powf(exp) });
    engine.register_fn("POW", |base: f64, exp: i64| -> f64 { base.powf(exp as f64) });
    engine.register_fn("POW", |base: i64, exp: f64| -> f64 { (base as f64).powf(exp) });
    engine.register_fn("POW", |base: i64, exp: i64| -> f64 {
        (base as f64).powf(exp as f64)
    });

    engine.register_fn("SQRT", |x: f64| -> f64 { x.sqrt() });
    engine.register_fn("SQRT", |x: i64| -> f64 { (x as f64).sqrt() });

    // FIXED(n, decimals): fixed number of decimal places
    engine.register_fn(
        "FIXED",
        |n: f64, decimals: i64| -> Result<String, Box<EvalAltResult>> { fixed(n, decimals) },
    );
    engine.register_fn(
        "FIXED",
        |n: i64, decimals: i64| -> Result<String, Box<EvalAltResult>> { fixed(n as f64, decimals) },
    );
}

fn fixed(n: f64, decimals: i64) -> Result<String, Box<EvalAltResult>> {
    const MAX_DECIMALS: usize = 12;
    let places = to_index(decimals)
        .filter(|p| *p <= MAX_DECIMALS)
        .ok_or_else(|| invalid_arg(&format!("decimals must be in 0..={}", MAX_DECIMALS)))?;
    if n.is_nan() {
        return Ok("#NAN!".to_string());
    }
    if n.is_infinite() {
        return Ok("#INF!".to_string());
    }
    Ok(format!("{:.*}", places, n))
}
