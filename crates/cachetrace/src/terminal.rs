//! Terminal UI utilities for progress indication and styled output.

use std::io::{self, Write};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for determinate progress.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    /// Create a new progress bar with a total count.
    pub fn new(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:30.cyan/dim}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸━");
        bar.set_style(style);
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Increment the progress bar.
    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    /// Finish the progress bar.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

// ============================================================================
// Styled output helpers
// ============================================================================

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", style("→").cyan(), message);
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print a path output (like "-> /path/to/file").
pub fn path_output(path: &std::path::Path) {
    eprintln!("  {} {}", style("→").dim(), style(path.display()).dim());
}

// ============================================================================
// Table output
// ============================================================================

/// A builder for markdown tables.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    alignments: Vec<Alignment>,
}

/// Column alignment.
#[derive(Clone, Copy, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

impl Table {
    pub fn new(headers: Vec<&str>) -> Self {
        let count = headers.len();
        Self {
            headers: headers.into_iter().map(String::from).collect(),
            rows: Vec::new(),
            alignments: vec![Alignment::Left; count],
        }
    }

    pub fn with_alignments(mut self, alignments: Vec<Alignment>) -> Self {
        self.alignments = alignments;
        self
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(String::len).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }
        widths
    }

    /// Render the table as a markdown table.
    pub fn render(&self) -> String {
        use std::fmt::Write as _;

        if self.headers.is_empty() {
            return String::new();
        }
        let widths = self.widths();
        let align = |i: usize| self.alignments.get(i).copied().unwrap_or_default();
        let mut out = String::new();

        out.push('|');
        for (header, w) in self.headers.iter().zip(&widths) {
            let _ = write!(out, " {header:^w$} |");
        }
        out.push('\n');

        out.push('|');
        for (i, w) in widths.iter().enumerate() {
            let _ = match align(i) {
                Alignment::Left => write!(out, ":{:-<w$}|", "", w = w + 1),
                Alignment::Right => write!(out, "{:-<w$}:|", "", w = w + 1),
            };
        }
        out.push('\n');

        for row in &self.rows {
            out.push('|');
            for (i, (cell, w)) in row.iter().zip(&widths).enumerate() {
                let _ = match align(i) {
                    Alignment::Left => write!(out, " {cell:<w$} |"),
                    Alignment::Right => write!(out, " {cell:>w$} |"),
                };
            }
            out.push('\n');
        }
        out
    }

    /// Print the table to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
        let _ = io::stdout().flush();
    }
}
