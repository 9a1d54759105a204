//! Command implementations for the CLI.

mod config;
mod list;
mod show;
mod watch;

pub use config::cmd_config;
pub use list::cmd_list;
pub use show::{ShowArgs, cmd_show};
pub use watch::{WatchArgs, cmd_watch};

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nodewatch_core::source::{FileSource, FileSourceOptions};
use nodewatch_core::{ConnectionStatus, Engine, EngineOptions};
use tracing::debug;

use crate::cli::SourceArgs;
use crate::config::Config;

/// Start an engine on the source named by the flags, falling back to the
/// config file. A `--file` flag wins, then a database URL, then
/// `file.path` from the config.
pub fn connect(config: &Config, args: &SourceArgs, options: EngineOptions) -> Result<Engine> {
    let path = args
        .path
        .clone()
        .unwrap_or_else(|| config.database.path.clone());
    let options = options.path(path);

    let file_options = FileSourceOptions::with_interval(config.file.poll_interval());

    if let Some(file) = &args.file {
        debug!("Using file source {}", file.display());
        return start_file(file, file_options, options);
    }

    let url = args.url.clone().or_else(|| config.database.url.clone());
    if let Some(url) = url {
        let auth = args.auth.clone().or_else(|| config.database.auth.clone());
        return start_database(url, auth, options);
    }

    if let Some(file) = &config.file.path {
        debug!("Using file source {} from config", file.display());
        return start_file(file, file_options, options);
    }

    bail!(
        "No data source configured. Pass --url or --file, or set database.url in {}",
        Config::default_path().display()
    )
}

fn start_file(
    file: &std::path::Path,
    file_options: FileSourceOptions,
    options: EngineOptions,
) -> Result<Engine> {
    let source = FileSource::with_options(file, file_options);
    Engine::start(source, options)
        .with_context(|| format!("Failed to watch {}", file.display()))
}

#[cfg(feature = "firebase")]
fn start_database(url: String, auth: Option<String>, options: EngineOptions) -> Result<Engine> {
    use nodewatch_core::source::{FirebaseOptions, FirebaseSource};

    let mut firebase = FirebaseOptions::new(url.clone());
    if let Some(auth) = auth {
        firebase = firebase.auth(auth);
    }
    let source = FirebaseSource::new(firebase)
        .with_context(|| format!("Failed to set up database client for {}", url))?;
    Engine::start(source, options).with_context(|| format!("Failed to subscribe to {}", url))
}

#[cfg(not(feature = "firebase"))]
fn start_database(url: String, _auth: Option<String>, _options: EngineOptions) -> Result<Engine> {
    bail!(
        "Cannot connect to {}: this build has no database support (feature \"firebase\")",
        url
    )
}

/// Wait until the first push (data or error) arrives.
///
/// Fails if nothing arrives within `timeout` or if the first push is an error.
pub async fn wait_for_data(engine: &Engine, timeout: Duration) -> Result<()> {
    let mut status = engine.watch_status();
    let first = tokio::time::timeout(
        timeout,
        status.wait_for(|s| !matches!(s, ConnectionStatus::Connecting)),
    )
    .await;

    let state = match first {
        Err(_) => bail!(
            "No data received from {} within {}s",
            engine.description(),
            timeout.as_secs()
        ),
        Ok(Err(_)) => bail!("Engine stopped before any data arrived"),
        Ok(Ok(state)) => state.clone(),
    };

    match state {
        ConnectionStatus::Offline { error } => {
            bail!("Failed to load nodes from {}: {}", engine.description(), error)
        }
        ConnectionStatus::Stopped => bail!("Engine stopped before any data arrived"),
        _ => Ok(()),
    }
}

/// Write to stdout and flush.
pub fn write_stdout(content: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_nodes(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("nodes.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_connect_without_source_fails() {
        let err = connect(&Config::default(), &SourceArgs::default(), EngineOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("No data source configured"));
    }

    #[tokio::test]
    async fn test_connect_file_flag_and_wait() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_nodes(&dir, r#"{"nodes": {"a": {"temp": 1.5}}}"#);
        let args = SourceArgs {
            file: Some(file),
            ..SourceArgs::default()
        };

        let engine = connect(&Config::default(), &args, EngineOptions::default()).unwrap();
        wait_for_data(&engine, Duration::from_secs(5)).await.unwrap();
        assert_eq!(engine.node_ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_file_from_config_with_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_nodes(&dir, r#"{"sites": {"north": {"b": {}}}}"#);
        let mut config = Config::default();
        config.file.path = Some(file);
        config.database.path = "sites/north".to_string();

        let engine = connect(&config, &SourceArgs::default(), EngineOptions::default()).unwrap();
        wait_for_data(&engine, Duration::from_secs(5)).await.unwrap();
        assert_eq!(engine.node_ids(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_for_data_reports_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = SourceArgs {
            file: Some(dir.path().join("missing.json")),
            ..SourceArgs::default()
        };

        let engine = connect(&Config::default(), &args, EngineOptions::default()).unwrap();
        let err = wait_for_data(&engine, Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to load nodes"));
    }
}
