//! Terminal report for reconciliation results

use colored::Colorize;
use declarative::{Change, ChangeFlag, FieldChange, Outcome, StateResult, Summary};
use serde_json::Value;

/// Event keys that describe something going away
const REMOVAL_EVENTS: &[&str] = &["removed", "disconnected", "stopped", "disabled"];

fn outcome_marker(outcome: Outcome) -> String {
    match outcome {
        Outcome::Unchanged => "✓".dimmed().to_string(),
        Outcome::Converged => "✓".green().to_string(),
        Outcome::Predicted => "?".yellow().to_string(),
        Outcome::Failed => "✗".red().to_string(),
    }
}

/// Plain rendering of a JSON value: strings unquoted, lists comma-joined
fn show(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(show).collect::<Vec<_>>().join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", show(v)))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn field_line(key: &str, change: &FieldChange) -> String {
    match change.flag {
        Some(ChangeFlag::Set) => format!("{} {key}: {}", "+".green(), show(&change.new)),
        Some(ChangeFlag::Unset) => format!("{} {key}: {}", "-".red(), show(&change.old)),
        None => format!(
            "{} {key}: {} → {}",
            "~".yellow(),
            show(&change.old),
            show(&change.new)
        ),
    }
}

fn event_line(key: &str, value: &Value) -> String {
    let marker = if REMOVAL_EVENTS.contains(&key) {
        "-".red()
    } else {
        "+".green()
    };
    format!("{marker} {key}: {}", show(value))
}

/// Render one result with a line per change
pub fn render(result: &StateResult) -> String {
    let mut lines = vec![format!(
        "{} {}: {}",
        outcome_marker(result.outcome),
        result.resource_id.bold(),
        result.message
    )];
    for (key, change) in &result.changes {
        let line = match change {
            Change::Field(field) => field_line(key, field),
            Change::Event(value) => event_line(key, value),
        };
        lines.push(format!("    {line}"));
    }
    lines.join("\n")
}

/// One-line tally of a batch of results
pub fn render_summary(summary: &Summary) -> String {
    let failed = if summary.failed > 0 {
        format!("{} failed", summary.failed).red().to_string()
    } else {
        format!("{} failed", summary.failed).dimmed().to_string()
    };
    format!(
        "{} states: {}, {}, {}, {}",
        summary.total(),
        format!("{} changed", summary.converged).green(),
        format!("{} would change", summary.predicted).yellow(),
        format!("{} unchanged", summary.unchanged).dimmed(),
        failed
    )
}
