//! Formula preprocessing.
//!
//! Before a formula can be evaluated by Rhai, spreadsheet references must be
//! rewritten into built-in calls:
//!
//! - `A1` → `CELL(0, 0)` (numeric value)
//! - `@A1` → `VALUE(0, 0)` (typed value)
//! - `SUM(A1:B5)` → `SUM_RANGE(0, 0, 4, 1)` (row/col of both corners)
//!
//! Text inside string literals is never rewritten.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::cell_ref::CellRef;
use super::deps::cell_ref_re;

fn value_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@([A-Za-z]+)([0-9]+)\b").expect("typed reference regex must compile")
    })
}

/// Rewrite a formula (stored without its leading `=`) into an evaluable script.
pub fn preprocess_script(script: &str) -> String {
    let mut out = String::with_capacity(script.len() + 16);
    for (in_string, segment) in split_string_literals(script) {
        if in_string {
            out.push_str(segment);
        } else {
            out.push_str(&rewrite_segment(segment));
        }
    }
    out
}

fn rewrite_segment(segment: &str) -> String {
    let ranges = crate::builtins::range_fn_re().replace_all(segment, |caps: &Captures| {
        let Some(rhai_name) = crate::builtins::range_rhai_name(&caps[1]) else {
            return caps[0].to_string();
        };
        match (CellRef::from_str(&caps[2]), CellRef::from_str(&caps[3])) {
            (Some(start), Some(end)) => format!(
                "{}({}, {}, {}, {})",
                rhai_name, start.row, start.col, end.row, end.col
            ),
            _ => caps[0].to_string(),
        }
    });

    let typed = value_ref_re().replace_all(&ranges, |caps: &Captures| {
        rewrite_ref(&caps[0], &caps[1], &caps[2], "VALUE")
    });

    cell_ref_re()
        .replace_all(&typed, |caps: &Captures| {
            rewrite_ref(&caps[0], &caps[1], &caps[2], "CELL")
        })
        .into_owned()
}

fn rewrite_ref(whole: &str, letters: &str, numbers: &str, func: &str) -> String {
    match CellRef::from_str(&format!("{}{}", letters, numbers)) {
        Some(cr) => format!("{}({}, {})", func, cr.row, cr.col),
        None => whole.to_string(),
    }
}

/// Split a script into alternating code / string-literal segments.
/// String segments keep their quotes; escaped quotes do not end a literal.
fn split_string_literals(script: &str) -> Vec<(bool, &str)> {
    let bytes = script.as_bytes();
    let mut segments = Vec::new();
    let mut seg_start = 0;
    let mut in_string = false;
    let mut backslashes = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if b == b'\\' {
                backslashes += 1;
                continue;
            }
            if b == b'"' && backslashes % 2 == 0 {
                segments.push((true, &script[seg_start..=i]));
                in_string = false;
                seg_start = i + 1;
            }
            backslashes = 0;
        } else if b == b'"' {
            if seg_start < i {
                segments.push((false, &script[seg_start..i]));
            }
            in_string = true;
            seg_start = i;
            backslashes = 0;
        }
    }

    if seg_start < script.len() {
        segments.push((in_string, &script[seg_start..]));
    }
    segments
}
