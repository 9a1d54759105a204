//! Watch command implementation.
//!
//! Prints the followed node (or every node) once on start and again after
//! each snapshot the engine applies. Source errors are reported on stderr
//! while the last good data stays on screen.

use std::future::Future;
use std::io::Write;

use anyhow::Result;
use nodewatch_core::{Engine, EngineEvent, NodeView};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::macros::format_description;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::cli::OutputFormat;
use crate::format::{
    FormatOptions, format_watch_csv_header, format_watch_csv_line, format_watch_line,
};

use nodewatch_core::timestamp::local_now;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    /// Node to follow. Must already be the engine's selection.
    pub node: Option<&'a str>,
    pub count: u32,
    pub format: OutputFormat,
    pub opts: &'a FormatOptions,
    pub quiet: bool,
}

pub async fn cmd_watch(engine: &Engine, args: WatchArgs<'_>) -> Result<()> {
    if !args.quiet {
        let target = match args.node {
            Some(node) => nodewatch_core::display::node_title(node),
            None => "all nodes".to_string(),
        };
        let source = engine.description();
        if args.opts.no_color {
            eprintln!("Watching: {} ({})", target, source);
        } else {
            eprintln!("Watching: {} ({})", target.green(), source.cyan());
        }
        if args.count > 0 {
            eprintln!("Count: {} | Press Ctrl+C to stop", args.count);
        } else {
            eprintln!("Press Ctrl+C to stop");
        }
        eprintln!("{}", "-".repeat(50));
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        eprintln!("\nShutting down...");
    };
    let mut stdout = std::io::stdout();
    let printed = watch_loop(engine, &args, &mut stdout, shutdown).await?;

    if !args.quiet && args.count > 0 && printed >= args.count {
        eprintln!("Completed {} updates.", printed);
    }
    Ok(())
}

/// One line of JSON `watch` output.
#[derive(Serialize)]
struct WatchEntry<'a> {
    printed_at: &'a str,
    revision: u64,
    #[serde(flatten)]
    node: &'a NodeView,
}

struct Printer<'a, W: Write> {
    args: &'a WatchArgs<'a>,
    out: &'a mut W,
    header_written: bool,
    last_revision: u64,
    printed: u32,
}

impl<W: Write> Printer<'_, W> {
    /// Print the current data unless it was printed already.
    fn print_if_newer(&mut self, engine: &Engine) -> Result<()> {
        let revision = engine.revision();
        if revision == 0 || revision <= self.last_revision {
            return Ok(());
        }
        self.last_revision = revision;

        let now = local_now();
        let printed_at = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_else(|_| "??:??:??".to_string());

        let views: Vec<NodeView> = match self.args.node {
            Some(_) => engine.selected_view(now).into_iter().collect(),
            None => engine.node_views(now),
        };

        let opts = self.args.opts;
        let mut content = String::new();
        match self.args.format {
            OutputFormat::Text => {
                if views.is_empty() {
                    let missing = self.args.node.unwrap_or("any node");
                    content.push_str(&format!("{}  {} not in current data\n", printed_at, missing));
                }
                for view in &views {
                    content.push_str(&format_watch_line(view, &printed_at, opts));
                }
            }
            OutputFormat::Csv => {
                if !self.header_written && !opts.no_header {
                    content.push_str(&format_watch_csv_header());
                }
                self.header_written = true;
                for view in &views {
                    content.push_str(&format_watch_csv_line(view, &printed_at));
                }
            }
            OutputFormat::Json => {
                for view in &views {
                    let entry = WatchEntry {
                        printed_at: &printed_at,
                        revision,
                        node: view,
                    };
                    content.push_str(&serde_json::to_string(&entry)?);
                    content.push('\n');
                }
            }
        }

        self.out.write_all(content.as_bytes())?;
        self.out.flush()?;
        // Placeholder lines do not count towards `--count`.
        if !views.is_empty() {
            self.printed += 1;
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.args.count > 0 && self.printed >= self.args.count
    }
}

/// Print updates until `count` is reached, the engine stops, or `shutdown`
/// completes. Returns the number of updates that showed node data.
async fn watch_loop<W, F>(
    engine: &Engine,
    args: &WatchArgs<'_>,
    out: &mut W,
    shutdown: F,
) -> Result<u32>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut events = engine.subscribe_events();
    let mut printer = Printer {
        args,
        out,
        header_written: false,
        last_revision: 0,
        printed: 0,
    };
    printer.print_if_newer(engine)?;

    tokio::pin!(shutdown);
    while !printer.done() {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(EngineEvent::SnapshotApplied { .. }) => printer.print_if_newer(engine)?,
                Ok(EngineEvent::ConnectionError { error }) => {
                    if !args.quiet {
                        eprintln!("Connection error: {}. Showing last received data.", error);
                    }
                }
                Ok(EngineEvent::Stopped) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} engine events", skipped);
                    printer.print_if_newer(engine)?;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(printer.printed)
}
