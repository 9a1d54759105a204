use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use nodewatch_cli::cli::{Cli, Commands, OutputArgs, SourceArgs};
use nodewatch_cli::commands::{
    ShowArgs, WatchArgs, cmd_config, cmd_list, cmd_show, cmd_watch, connect, wait_for_data,
};
use nodewatch_cli::config::Config;
use nodewatch_cli::format::FormatOptions;
use nodewatch_core::{Engine, EngineOptions, SelectionPolicy};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "nodewatch", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Config { action } => cmd_config(action, &config_path, cli.json),
        Commands::List { source, output } => {
            let config = load_config(&config_path)?;
            let opts = format_options(cli.no_color, &output);
            let engine = start(&config, &source, &output, EngineOptions::default()).await?;
            cmd_list(&engine, output.resolve_format(cli.json), &opts)
        }
        Commands::Show {
            node,
            source,
            output,
            policy,
        } => {
            let config = load_config(&config_path)?;
            let Some(node) = node.or_else(|| config.selection.default_node.clone()) else {
                bail!("No node given and selection.default_node is not set");
            };
            let policy = policy.map_or(config.selection.policy, SelectionPolicy::from);
            let opts = format_options(cli.no_color, &output);
            let options = EngineOptions::default().policy(policy);
            let engine = start(&config, &source, &output, options).await?;
            cmd_show(
                &engine,
                ShowArgs {
                    node: &node,
                    format: output.resolve_format(cli.json),
                    opts: &opts,
                },
            )
        }
        Commands::Watch {
            node,
            source,
            output,
            count,
        } => {
            let config = load_config(&config_path)?;
            let node = node.or_else(|| config.selection.default_node.clone());
            let mut options = EngineOptions::default().policy(SelectionPolicy::AcceptAbsent);
            if let Some(node) = &node {
                options = options.initial_selection(node.as_str());
            }
            let opts = format_options(cli.no_color, &output);
            let engine = start(&config, &source, &output, options).await?;
            cmd_watch(
                &engine,
                WatchArgs {
                    node: node.as_deref(),
                    count,
                    format: output.resolve_format(cli.json),
                    opts: &opts,
                    quiet: cli.quiet,
                },
            )
            .await
        }
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_validated(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn format_options(no_color: bool, output: &OutputArgs) -> FormatOptions {
    FormatOptions::new(no_color).with_no_header(output.no_header)
}

/// Start the engine and wait for the first data.
async fn start(
    config: &Config,
    source: &SourceArgs,
    output: &OutputArgs,
    options: EngineOptions,
) -> Result<Engine> {
    let locale = output.locale.unwrap_or(config.display.locale);
    let engine = connect(config, source, options.locale(locale))?;
    wait_for_data(&engine, Duration::from_secs(source.timeout)).await?;
    Ok(engine)
}
