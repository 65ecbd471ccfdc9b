//! Markdown export of a workbook's computed grid.

use gridsync_engine::engine::CellRef;
use std::fmt::Write;

/// Render `grid` (row-major display values) as a markdown section.
pub fn render_markdown(title: &str, grid: &[Vec<String>]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_table(&mut out, title, grid);
    out
}

fn write_table<W: Write>(w: &mut W, title: &str, grid: &[Vec<String>]) -> std::fmt::Result {
    writeln!(w, "## {}", title)?;
    writeln!(w)?;

    let num_cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    if num_cols == 0 {
        writeln!(w, "*Empty spreadsheet*")?;
        return Ok(());
    }

    // Header with column letters
    write!(w, "|   |")?;
    for col in 0..num_cols {
        write!(w, " {} |", CellRef::col_to_letters(col))?;
    }
    writeln!(w)?;

    write!(w, "|---|")?;
    for _ in 0..num_cols {
        write!(w, "---|")?;
    }
    writeln!(w)?;

    for (row, values) in grid.iter().enumerate() {
        write!(w, "| {} |", row + 1)?; // 1-based row numbers
        for col in 0..num_cols {
            let display = values.get(col).map(String::as_str).unwrap_or("");
            write!(w, " {} |", escape_markdown(display))?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Escape special markdown characters in cell content
fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ").replace('\r', "")
}
