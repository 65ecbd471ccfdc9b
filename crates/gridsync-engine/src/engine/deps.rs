//! Dependency extraction from formula strings.
//!
//! Finds every cell a formula reads (`A1`, `@B2`, `SUM(A1:B5)`) so the
//! workbook can invalidate cached results and detect cycles. References
//! inside string literals are ignored.

use regex::Regex;
use std::sync::OnceLock;

use super::cell_ref::CellRef;

const MAX_DEPENDENCY_RANGE_CELLS: usize = 1_000_000;

/// Extract all cell references from a script as dependencies.
pub fn extract_dependencies(script: &str) -> Vec<CellRef> {
    let mut deps = Vec::new();
    let script = strip_string_literals(script);

    let range_re = crate::builtins::range_fn_re();
    let script_without_ranges = range_re.replace_all(&script, "").to_string();

    for caps in range_re.captures_iter(&script) {
        let (Some(start), Some(end)) = (CellRef::from_str(&caps[2]), CellRef::from_str(&caps[3]))
        else {
            continue;
        };
        let (min_row, max_row) = (start.row.min(end.row), start.row.max(end.row));
        let (min_col, max_col) = (start.col.min(end.col), start.col.max(end.col));

        let Some(cell_count) = (max_row - min_row + 1).checked_mul(max_col - min_col + 1) else {
            continue;
        };
        if cell_count > MAX_DEPENDENCY_RANGE_CELLS {
            continue;
        }

        for row in min_row..=max_row {
            for col in min_col..=max_col {
                deps.push(CellRef::new(row, col));
            }
        }
    }

    for caps in cell_ref_re().captures_iter(&script_without_ranges) {
        if let Some(cr) = CellRef::from_str(&format!("{}{}", &caps[1], &caps[2])) {
            deps.push(cr);
        }
    }

    deps
}

pub(crate) fn cell_ref_re() -> &'static Regex {
    static CELL_RE: OnceLock<Regex> = OnceLock::new();
    CELL_RE.get_or_init(|| {
        Regex::new(r"\b([A-Za-z]+)([0-9]+)\b")
            .expect("dependency cell reference regex must compile")
    })
}

/// Blank out the contents of string literals, keeping byte offsets stable.
pub(crate) fn strip_string_literals(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in script.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(' ');
                continue;
            }
            if ch == '\\' {
                escaped = true;
                out.push(' ');
                continue;
            }
            if ch == '"' {
                in_string = false;
                out.push('"');
            } else {
                out.push(' ');
            }
        } else if ch == '"' {
            in_string = true;
            out.push('"');
        } else {
            out.push(ch);
        }
    }

    out
}

/// Parse a cell range like "A1:B5" into its (start, end) corners.
pub fn parse_range(range: &str) -> Option<(CellRef, CellRef)> {
    let (start, end) = range.split_once(':')?;
    Some((CellRef::from_str(start)?, CellRef::from_str(end)?))
}
