//! List command implementation.

use anyhow::Result;
use nodewatch_core::Engine;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, NodeListing, format_list_csv, format_list_text};

use nodewatch_core::timestamp::local_now;

use super::write_stdout;

pub fn cmd_list(engine: &Engine, format: OutputFormat, opts: &FormatOptions) -> Result<()> {
    let content = render_list(engine, format, opts)?;
    write_stdout(&content)
}

fn render_list(engine: &Engine, format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    let views = engine.node_views(local_now());
    let status = engine.status();

    Ok(match format {
        OutputFormat::Text => format_list_text(&views, &status, opts),
        OutputFormat::Csv => format_list_csv(&views, opts),
        OutputFormat::Json => opts.as_json(&NodeListing {
            status: &status,
            revision: engine.revision(),
            nodes: &views,
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch_core::{EngineOptions, MockSource};
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> Engine {
        let source = Arc::new(MockSource::with_value(json!({
            "south": { "temp": 18.0 },
            "north": { "temp": 21.5, "hum": 40 }
        })));
        Engine::start(source, EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_render_list_text_sorted() {
        let text = render_list(&engine(), OutputFormat::Text, &FormatOptions::new(true)).unwrap();
        assert!(text.starts_with("2 node(s) [live]"));
        let north = text.find("north").unwrap();
        let south = text.find("south").unwrap();
        assert!(north < south);
    }

    #[test]
    fn test_render_list_json() {
        let json = render_list(&engine(), OutputFormat::Json, &FormatOptions::new(true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["revision"], 1);
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["nodes"][0]["humidity"], "40 %");
    }

    #[test]
    fn test_render_list_csv() {
        let csv = render_list(&engine(), OutputFormat::Csv, &FormatOptions::new(true)).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
