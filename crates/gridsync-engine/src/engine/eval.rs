//! Rhai engine creation and formula evaluation.

use rhai::{Engine, EvalAltResult};

use super::{Dynamic, Grid, ValueCache, preprocess_script};

/// Nesting limit for formulas that reference other formulas.
const MAX_CALL_LEVELS: usize = 64;

/// Create a Rhai engine with built-ins registered over a shared grid and cache.
pub fn create_engine(grid: Grid, value_cache: ValueCache) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    crate::builtins::register_builtins(&mut engine, grid, value_cache);
    engine
}

/// Evaluate a formula (stored without its leading `=`).
pub fn eval_formula(engine: &Engine, formula: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    engine.eval::<Dynamic>(&preprocess_script(formula))
}
