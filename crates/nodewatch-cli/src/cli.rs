//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nodewatch_core::{Locale, SelectionPolicy};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// How selecting a node that is not in the current data is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Reject the selection and keep the previous one
    KeepPrevious,
    /// Select the node anyway and wait for it to appear
    AcceptAbsent,
}

impl From<PolicyArg> for SelectionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::KeepPrevious => SelectionPolicy::KeepPrevious,
            PolicyArg::AcceptAbsent => SelectionPolicy::AcceptAbsent,
        }
    }
}

/// Where node data comes from. Flags override the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Realtime database URL, or use NODEWATCH_DATABASE_URL env var
    #[arg(long, env = "NODEWATCH_DATABASE_URL")]
    pub url: Option<String>,

    /// Database auth token, or use NODEWATCH_DATABASE_AUTH env var
    #[arg(long, env = "NODEWATCH_DATABASE_AUTH", hide_env_values = true)]
    pub auth: Option<String>,

    /// Read nodes from a local JSON file (takes precedence over --url)
    #[arg(short = 'F', long)]
    pub file: Option<PathBuf>,

    /// Path of the node collection
    #[arg(short, long)]
    pub path: Option<String>,

    /// Seconds to wait for the first data before giving up
    #[arg(short = 'T', long, default_value = "10")]
    pub timeout: u64,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Language for dates and relative ages (en, es)
    #[arg(short, long)]
    pub locale: Option<Locale>,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long)]
    pub no_header: bool,
}

impl OutputArgs {
    /// `--json` wins over `--format`.
    pub fn resolve_format(&self, json: bool) -> OutputFormat {
        if json { OutputFormat::Json } else { self.format }
    }
}

#[derive(Parser)]
#[command(name = "nodewatch")]
#[command(author, version, about = "Live telemetry viewer for IoT sensor nodes", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "NODEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all nodes in the current data
    List {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the readings of one node
    Show {
        /// Node id (defaults to selection.default_node from config)
        node: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Handling of a node id that is not in the data
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Follow one node (or all nodes) and print every update
    Watch {
        /// Node id to follow; all nodes when omitted
        node: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Number of updates with node data to print before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_show_with_file() {
        let cli = Cli::try_parse_from([
            "nodewatch", "show", "greenhouse", "--file", "nodes.json", "--locale", "es",
        ])
        .unwrap();
        match cli.command {
            Commands::Show {
                node,
                source,
                output,
                policy,
            } => {
                assert_eq!(node.as_deref(), Some("greenhouse"));
                assert_eq!(source.file, Some(PathBuf::from("nodes.json")));
                assert_eq!(output.locale, Some(Locale::Spanish));
                assert!(policy.is_none());
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::try_parse_from(["nodewatch", "watch"]).unwrap();
        match cli.command {
            Commands::Watch {
                node,
                source,
                count,
                ..
            } => {
                assert!(node.is_none());
                assert_eq!(count, 0);
                assert_eq!(source.timeout, 10);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_json_flag_overrides_format() {
        let cli = Cli::try_parse_from(["nodewatch", "--json", "list", "--format", "csv"]).unwrap();
        let Commands::List { output, .. } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(output.resolve_format(cli.json), OutputFormat::Json);
        assert_eq!(output.resolve_format(false), OutputFormat::Csv);
    }

    #[test]
    fn test_policy_arg_conversion() {
        assert_eq!(
            SelectionPolicy::from(PolicyArg::AcceptAbsent),
            SelectionPolicy::AcceptAbsent
        );
    }

    #[test]
    fn test_unknown_locale_rejected() {
        let result = Cli::try_parse_from(["nodewatch", "list", "--locale", "fr"]);
        assert!(result.is_err());
    }
}
