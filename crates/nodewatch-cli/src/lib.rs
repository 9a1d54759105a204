//! Command-line viewer for live IoT node telemetry.
//!
//! `nodewatch` subscribes to a collection of sensor nodes (a realtime
//! database path or a local JSON file) and prints their readings.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list` | All nodes with their latest readings |
//! | `show` | Detailed readings of one node |
//! | `watch` | Print one node (or all nodes) on every update |
//! | `config` | Show, locate or create the configuration file |
//! | `completions` | Generate shell completions |
//!
//! # Output Formats
//!
//! - **Text** (default): Human-readable colored output
//! - **JSON**: Machine-readable JSON (one object per line for `watch`)
//! - **CSV**: Comma-separated values
//!
//! # Configuration
//!
//! Settings are read from `~/.config/nodewatch/config.toml` (or platform
//! equivalent). See [`config::Config`].
//!
//! # Environment Variables
//!
//! - `NODEWATCH_DATABASE_URL`: Database URL (overridden by `--url`)
//! - `NODEWATCH_DATABASE_AUTH`: Database auth token (overridden by `--auth`)
//! - `NODEWATCH_CONFIG`: Config file location (overridden by `--config`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! List nodes from a database:
//! ```bash
//! nodewatch list --url https://example-default-rtdb.firebaseio.com
//! ```
//!
//! Show one node from a local file, in Spanish:
//! ```bash
//! nodewatch show greenhouse --file nodes.json --locale es
//! ```
//!
//! Follow a node as JSON lines:
//! ```bash
//! nodewatch watch greenhouse --json
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;

pub use nodewatch_core;
