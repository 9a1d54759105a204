//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

use super::write_stdout;

pub fn cmd_config(action: ConfigAction, path: &Path, json: bool) -> Result<()> {
    let content = render_config(action, path, json)?;
    write_stdout(&content)
}

fn render_config(action: ConfigAction, path: &Path, json: bool) -> Result<String> {
    match action {
        ConfigAction::Path => Ok(format!("{}\n", path.display())),
        ConfigAction::Show => {
            if !path.exists() {
                eprintln!("No config file at {}; showing defaults.", path.display());
            }
            let mut config = Config::load_or_default(path)?;
            config.apply_env_overrides();
            let shown = config.redacted();
            if json {
                Ok(serde_json::to_string_pretty(&shown)? + "\n")
            } else {
                toml::to_string_pretty(&shown).context("Failed to serialize config")
            }
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            Ok(format!("Created config file at {}\n", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path() {
        let out = render_config(ConfigAction::Path, Path::new("/tmp/nw.toml"), false).unwrap();
        assert_eq!(out, "/tmp/nw.toml\n");
    }

    #[test]
    fn test_init_then_refuse_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let out = render_config(ConfigAction::Init { force: false }, &path, false).unwrap();
        assert!(out.starts_with("Created config file"));
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        let err = render_config(ConfigAction::Init { force: false }, &path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        render_config(ConfigAction::Init { force: true }, &path, false).unwrap();
    }

    #[test]
    fn test_show_json_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[selection]\ndefault_node = \"shed\"\n").unwrap();

        let out = render_config(ConfigAction::Show, &path, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["selection"]["default_node"], "shed");
        assert_eq!(value["database"]["path"], "nodes");
    }

    #[test]
    fn test_show_rejects_broken_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [toml").unwrap();
        assert!(render_config(ConfigAction::Show, &path, false).is_err());
    }
}
