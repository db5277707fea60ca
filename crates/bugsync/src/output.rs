//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use bugsync_core::{Bug, DrainReport, SyncStatus};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color ────────────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn status_label(status: SyncStatus, color: bool) -> String {
    let label = match status {
        SyncStatus::Synced => "synced",
        SyncStatus::PendingCreate => "pending create",
        SyncStatus::PendingUpdate => "pending update",
        SyncStatus::PendingDelete => "pending delete",
    };
    if !color {
        return label.to_owned();
    }
    match status {
        SyncStatus::Synced => label.green().to_string(),
        SyncStatus::PendingDelete => label.red().to_string(),
        SyncStatus::PendingCreate | SyncStatus::PendingUpdate => label.yellow().to_string(),
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct BugRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Priority")]
    priority: i64,
    #[tabled(rename = "Status")]
    status: String,
}

impl BugRow {
    pub fn new(bug: &Bug, color: bool) -> Self {
        Self {
            id: bug_id(bug),
            title: bug.title.clone(),
            priority: bug.priority,
            status: status_label(bug.status, color),
        }
    }
}

/// Identifier for plain output; unsaved bugs print as `-`.
pub fn bug_id(bug: &Bug) -> String {
    bug.id.as_ref().map_or_else(|| "-".into(), ToString::to_string)
}

/// Multi-line detail view for `show` and `save`.
pub fn bug_detail(bug: &Bug, color: bool) -> String {
    let mut lines = vec![
        format!("ID:          {}", bug_id(bug)),
        format!("Title:       {}", bug.title),
        format!("Priority:    {}", bug.priority),
        format!("Status:      {}", status_label(bug.status, color)),
    ];
    if !bug.description.is_empty() {
        lines.push(format!("Description: {}", bug.description));
    }
    if !bug.photo_path.is_empty() {
        lines.push(format!("Photo:       {}", bug.photo_path));
    }
    if bug.latitude != 0.0 || bug.longitude != 0.0 {
        lines.push(format!("Location:    {}, {}", bug.latitude, bug.longitude));
    }
    lines.join("\n")
}

pub fn drain_detail(report: &DrainReport) -> String {
    format!(
        "Synced:  {}\nRemoved: {}\nFailed:  {}\nSkipped: {}",
        report.synced, report.removed, report.failed, report.skipped
    )
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since single-item views don't use
/// the `Tabled` derive.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Status line on stderr, respecting quiet mode.
pub fn print_note(note: &str, quiet: bool) {
    if !quiet {
        eprintln!("{note}");
    }
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    out.map_err(|e| CliError::Render(e.to_string()))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Render(e.to_string()))
}
