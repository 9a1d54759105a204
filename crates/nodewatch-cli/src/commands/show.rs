//! Show command implementation.

use anyhow::{Result, anyhow, bail};
use nodewatch_core::{Engine, Error as CoreError};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_list_csv, format_node_text};

use nodewatch_core::timestamp::local_now;

use super::write_stdout;

/// Arguments for the show command.
pub struct ShowArgs<'a> {
    pub node: &'a str,
    pub format: OutputFormat,
    pub opts: &'a FormatOptions,
}

pub fn cmd_show(engine: &Engine, args: ShowArgs<'_>) -> Result<()> {
    let content = render_show(engine, &args)?;
    write_stdout(&content)
}

fn render_show(engine: &Engine, args: &ShowArgs<'_>) -> Result<String> {
    let ShowArgs { node, format, opts } = *args;

    match engine.select_node(node) {
        Ok(()) => {}
        Err(CoreError::SelectionNotFound(_)) => {
            bail!("Node '{}' not found. Available: {}", node, available(engine))
        }
        Err(e) => return Err(e.into()),
    }

    let view = engine.selected_view(local_now()).ok_or_else(|| {
        anyhow!(
            "Node '{}' has no data yet. Available: {}",
            node,
            available(engine)
        )
    })?;

    Ok(match format {
        OutputFormat::Text => format_node_text(&view, opts),
        OutputFormat::Json => opts.as_json(&view)?,
        OutputFormat::Csv => format_list_csv(std::slice::from_ref(&view), opts),
    })
}

fn available(engine: &Engine) -> String {
    let ids = engine.node_ids();
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
