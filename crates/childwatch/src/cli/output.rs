//! Rendering of alert lists for the terminal.

use crate::alert::Alert;
use crate::error::Result;

use super::OutputFormat;

/// Width the message column is cut to in table output.
const TABLE_MESSAGE_WIDTH: usize = 60;

/// Render `alerts` in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_alerts(alerts: &[Alert], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Plain => Ok(render_plain(alerts)),
        OutputFormat::Table => Ok(render_table(alerts)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(alerts)?),
    }
}

fn render_plain(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts.".to_string();
    }
    alerts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_table(alerts: &[Alert]) -> String {
    let mut out = format!("{:>6}  {:<9}  {:<19}  MESSAGE\n", "ID", "DISCLOSED", "TIMESTAMP");
    for alert in alerts {
        let id = alert.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let disclosed = if alert.disclosed { "yes" } else { "no" };
        out.push_str(&format!(
            "{:>6}  {:<9}  {:<19}  {}\n",
            id,
            disclosed,
            alert.timestamp,
            shorten(&alert.message, TABLE_MESSAGE_WIDTH)
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

/// Cut `text` to `width` characters, marking the cut with `...`.
fn shorten(text: &str, width: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let kept: String = single_line.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
