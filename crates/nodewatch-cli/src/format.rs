//! Output formatting for text, JSON, and CSV output.

use anyhow::Result;
use nodewatch_core::{ConnectionStatus, NodeView, RelativeAge};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            no_header: false,
        }
    }

    #[must_use]
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Serialize as pretty JSON with a trailing newline.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)? + "\n")
    }
}

/// A listing of every node plus the state it was taken in.
#[derive(Debug, Serialize)]
pub struct NodeListing<'a> {
    pub status: &'a ConnectionStatus,
    pub revision: u64,
    pub nodes: &'a [NodeView],
}

/// Escape a value for CSV output.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Connection status with color.
#[must_use]
pub fn format_status(status: &ConnectionStatus, no_color: bool) -> String {
    let label = status.to_string();
    if no_color {
        return format!("[{}]", label);
    }
    match status {
        ConnectionStatus::Live => format!("[{}]", label.green()),
        ConnectionStatus::Connecting => format!("[{}]", label.yellow()),
        ConnectionStatus::Offline { .. } => format!("[{}]", label.red()),
        ConnectionStatus::Stopped => format!("[{}]", label.dimmed()),
    }
}

/// Relative age, colored by how fresh the data is.
fn format_age(view: &NodeView, no_color: bool) -> String {
    let label = &view.last_sync.relative;
    if no_color {
        return label.clone();
    }
    match view.last_sync.age {
        Some(RelativeAge::JustNow | RelativeAge::Minutes(_)) => label.green().to_string(),
        Some(RelativeAge::Hours(_)) => label.yellow().to_string(),
        Some(RelativeAge::Days(_) | RelativeAge::OverAWeek) => label.red().to_string(),
        None => label.dimmed().to_string(),
    }
}

fn format_last_sync(view: &NodeView, no_color: bool) -> String {
    let sync = &view.last_sync;
    let age = format_age(view, no_color);
    if sync.time.is_empty() {
        format!("{} ({})", sync.date, age)
    } else {
        format!("{} {} ({})", sync.date, sync.time, age)
    }
}

/// Detailed text block for one node.
#[must_use]
pub fn format_node_text(view: &NodeView, opts: &FormatOptions) -> String {
    let mut output = String::new();

    if opts.no_color {
        output.push_str(&format!("  {}\n", view.title));
        output.push_str(&format!("  {}\n\n", "─".repeat(view.title.chars().count())));
    } else {
        output.push_str(&format!("  {}\n", view.title.cyan().bold()));
        output.push_str(&format!(
            "  {}\n\n",
            "─".repeat(view.title.chars().count()).dimmed()
        ));
    }

    let kv = |key: &str, value: &str| -> String {
        if opts.no_color {
            format!("  {:>11}:  {}\n", key, value)
        } else {
            format!("  {:>11}:  {}\n", key.dimmed(), value)
        }
    };

    output.push_str(&kv("Temperature", &view.temperature));
    output.push_str(&kv("Humidity", &view.humidity));
    output.push_str(&kv("Light", &view.light));
    output.push_str(&kv("Location", &view.location));
    output.push_str(&kv("Last sync", &format_last_sync(view, opts.no_color)));
    output
}

/// One line per node.
#[must_use]
pub fn format_list_text(views: &[NodeView], status: &ConnectionStatus, opts: &FormatOptions) -> String {
    let mut output = String::new();
    let count = if opts.no_color {
        views.len().to_string()
    } else {
        views.len().to_string().green().bold().to_string()
    };
    output.push_str(&format!(
        "{} node(s) {}\n",
        count,
        format_status(status, opts.no_color)
    ));

    if views.is_empty() {
        return output;
    }

    let width = views.iter().map(|v| v.id.chars().count()).max().unwrap_or(0);
    output.push('\n');
    for view in views {
        output.push_str(&format!(
            "  {:<width$}  {:>10}  {:>6}  {:>10}  {}\n",
            view.id,
            view.temperature,
            view.humidity,
            view.light,
            format_age(view, opts.no_color),
            width = width
        ));
    }
    output
}

const CSV_HEADER: &str = "id,temperature,humidity,light,location,date,time,relative";

fn csv_row(view: &NodeView) -> String {
    [
        view.id.as_str(),
        view.temperature.as_str(),
        view.humidity.as_str(),
        view.light.as_str(),
        view.location.as_str(),
        view.last_sync.date.as_str(),
        view.last_sync.time.as_str(),
        view.last_sync.relative.as_str(),
    ]
    .iter()
    .map(|field| csv_escape(field))
    .collect::<Vec<_>>()
    .join(",")
}

/// CSV table with one row per node.
#[must_use]
pub fn format_list_csv(views: &[NodeView], opts: &FormatOptions) -> String {
    let mut output = String::new();
    if !opts.no_header {
        output.push_str(CSV_HEADER);
        output.push('\n');
    }
    for view in views {
        output.push_str(&csv_row(view));
        output.push('\n');
    }
    output
}

/// One line of `watch` output, prefixed by the wall-clock time it was printed.
#[must_use]
pub fn format_watch_line(view: &NodeView, printed_at: &str, opts: &FormatOptions) -> String {
    let title = if opts.no_color {
        view.title.clone()
    } else {
        view.title.cyan().to_string()
    };
    format!(
        "{}  {}  {}  {}  {}  {}\n",
        printed_at,
        title,
        view.temperature,
        view.humidity,
        view.light,
        format_age(view, opts.no_color)
    )
}

/// Header for CSV `watch` output.
#[must_use]
pub fn format_watch_csv_header() -> String {
    format!("printed_at,{}\n", CSV_HEADER)
}

/// One CSV row of `watch` output.
#[must_use]
pub fn format_watch_csv_line(view: &NodeView, printed_at: &str) -> String {
    format!("{},{}\n", csv_escape(printed_at), csv_row(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch_core::{Locale, TelemetryRecord};
    use time::macros::datetime;

    fn sample_view() -> NodeView {
        let record = TelemetryRecord::new("01-06-24 10:00:00")
            .with_temperature(21.5)
            .with_humidity(60.0)
            .with_light(300.0)
            .with_location(40.7, -74.1);
        NodeView::from_record(
            "greenhouse",
            &record,
            datetime!(2024-06-01 13:00:00 UTC),
            Locale::English,
        )
    }

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("40.7, -74.1"), "\"40.7, -74.1\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_format_status_plain() {
        assert_eq!(format_status(&ConnectionStatus::Live, true), "[live]");
        let offline = ConnectionStatus::Offline {
            error: "closed".to_string(),
        };
        assert_eq!(format_status(&offline, true), "[offline (closed)]");
    }

    #[test]
    fn test_format_status_colored_contains_label() {
        let text = format_status(&ConnectionStatus::Connecting, false);
        assert!(text.contains("connecting"));
        assert!(text.contains('\u{1b}'));
    }

    #[test]
    fn test_format_node_text() {
        let text = format_node_text(&sample_view(), &plain());
        assert!(text.contains("Node Greenhouse"));
        assert!(text.contains("Temperature:  21.5 °C"));
        assert!(text.contains("   Location:  40.7, -74.1"));
        assert!(text.contains("Last sync:  01 Jun 2024 10:00 AM (3 h ago)"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_format_node_text_invalid_timestamp() {
        let record = TelemetryRecord::new("yesterday");
        let view = NodeView::from_record("x", &record, datetime!(2024-06-01 13:00:00 UTC), Locale::English);
        let text = format_node_text(&view, &plain());
        assert!(text.contains("Last sync:  yesterday (invalid format)"));
        assert!(text.contains("Temperature:  N/A"));
    }

    #[test]
    fn test_format_list_text() {
        let views = vec![sample_view()];
        let text = format_list_text(&views, &ConnectionStatus::Live, &plain());
        assert!(text.starts_with("1 node(s) [live]\n"));
        assert!(text.contains("greenhouse"));
        assert!(text.contains("3 h ago"));
    }

    #[test]
    fn test_format_list_text_empty() {
        let text = format_list_text(&[], &ConnectionStatus::Live, &plain());
        assert_eq!(text, "0 node(s) [live]\n");
    }

    #[test]
    fn test_format_list_csv() {
        let views = vec![sample_view()];
        let csv = format_list_csv(&views, &plain());
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some("greenhouse,21.5 °C,60 %,300 lux,\"40.7, -74.1\",01 Jun 2024,10:00 AM,3 h ago")
        );

        let no_header = format_list_csv(&views, &plain().with_no_header(true));
        assert!(no_header.starts_with("greenhouse,"));
    }

    #[test]
    fn test_format_watch_line() {
        let line = format_watch_line(&sample_view(), "13:00:05", &plain());
        assert_eq!(line, "13:00:05  Node Greenhouse  21.5 °C  60 %  300 lux  3 h ago\n");
    }

    #[test]
    fn test_format_watch_csv() {
        assert!(format_watch_csv_header().starts_with("printed_at,id,"));
        let line = format_watch_csv_line(&sample_view(), "13:00:05");
        assert!(line.starts_with("13:00:05,greenhouse,21.5 °C,"));
    }

    #[test]
    fn test_listing_json() {
        let views = vec![sample_view()];
        let listing = NodeListing {
            status: &ConnectionStatus::Live,
            revision: 3,
            nodes: &views,
        };
        let json = plain().as_json(&listing).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"]["state"], "live");
        assert_eq!(value["revision"], 3);
        assert_eq!(value["nodes"][0]["id"], "greenhouse");
        assert_eq!(value["nodes"][0]["last_sync"]["relative"], "3 h ago");
    }
}
