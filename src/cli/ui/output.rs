use console::{measure_text_width, pad_str, style, Alignment};

use crate::pipeline::TurnOutcome;
use crate::types::{ResultRow, Result, truncate_chars, value_text};

/// Widest cell shown in a result table
const MAX_CELL_CHARS: usize = 40;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Print a turn outcome as text or JSON
    pub fn outcome(&self, outcome: &TurnOutcome, format: &str) -> Result<()> {
        if format == "json" {
            println!("{}", serde_json::to_string_pretty(outcome)?);
            return Ok(());
        }

        match outcome {
            TurnOutcome::Success {
                thread_id,
                sql,
                rows,
                summary,
            } => {
                self.section("SQL");
                println!("{}", sql);
                self.section(&format!("Result ({} rows)", rows.len()));
                print!("{}", render_table(rows));
                if let Some(summary) = summary {
                    self.section("Summary");
                    println!("{}", summary);
                }
                println!();
                self.success(&format!("Thread {}", thread_id));
            }
            TurnOutcome::FollowUp {
                thread_id,
                question,
            } => {
                self.warning(question);
                self.info(&format!(
                    "Answer with: sqlquorum resume {} \"<reply>\"",
                    thread_id
                ));
            }
            TurnOutcome::Failure { code, message, .. } => {
                self.error(&format!("{} ({})", message, code));
            }
        }
        Ok(())
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

/// Render rows as an aligned text table; columns come from the first row
pub fn render_table(rows: &[ResultRow]) -> String {
    let Some(first) = rows.first() else {
        return "(no rows)\n".to_string();
    };

    let headers: Vec<String> = first.columns().map(str::to_string).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.values()
                .map(|v| truncate_chars(&value_text(v), MAX_CELL_CHARS))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| measure_text_width(h)).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(measure_text_width(cell));
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| pad_str(v, w, Alignment::Left, None).into_owned())
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&headers));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|&w| "─".repeat(w))
            .collect::<Vec<_>>()
            .join("─┼─"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}
