use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Rows returned by a report template, every cell already rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        render_grid(&self.columns, &self.rows)
    }

    /// First `max_rows` rows as a grid, for use as generation context.
    /// `None` when there is nothing to summarize.
    pub fn digest(&self, max_rows: usize) -> Option<String> {
        if self.is_empty() || max_rows == 0 {
            return None;
        }
        let head = &self.rows[..self.rows.len().min(max_rows)];
        Some(render_grid(&self.columns, head))
    }
}

fn render_grid(columns: &[String], rows: &[Vec<String>]) -> String {
    let width = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(columns.len()))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut widths = vec![0usize; width];
    for line in std::iter::once(columns).chain(rows.iter().map(Vec::as_slice)) {
        for (idx, cell) in line.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let rule = |edge: char| {
        let inner = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        format!("{edge}{inner}{edge}\n")
    };

    let mut out = rule('+');
    if !columns.is_empty() {
        push_row(&mut out, columns, &widths);
        out.push_str(&rule('|'));
    }
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out.push_str(&rule('+'));
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    out.push('|');
    for (idx, width) in widths.iter().enumerate() {
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        let pad = width - cell.chars().count();
        let _ = write!(out, " {cell}{} |", " ".repeat(pad));
    }
    out.push('\n');
}
