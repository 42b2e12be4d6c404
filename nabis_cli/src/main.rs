mod cli;
mod display;
mod error;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use error::NabisCliResult;
use log::{debug, info};
use nabis::config::Config;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path(),
    };
    let config = match config_path {
        Some(path) => read_config_from_toml(&path, args.config.is_some())?,
        None => Config::default(),
    };
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config)?;
    }
    Ok(())
}

// Linux: ~/.config/nabis/config.toml, macOS: ~/Library/Application Support/nabis/config.toml
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nabis").join("config.toml"))
}

/// Reads the configuration at `path`, falling back to the defaults when the file does not exist
/// and was not asked for explicitly.
fn read_config_from_toml(path: &Path, required: bool) -> NabisCliResult<Config> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            info!("Reading config from {}", path.display());
            Ok(toml::from_str(&contents)?)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(Config::default()),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Error reading config file {}", path.display()))
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_config_should_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_from_toml(&dir.path().join("config.toml"), false).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_explicit_config_should_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_config_from_toml(&dir.path().join("config.toml"), true).is_err());
    }

    #[test]
    fn partial_config_should_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "output_dir = \"out\"\n\n[spreadsheets]\nstrict_catalog = true\n",
        )
        .unwrap();
        let config = read_config_from_toml(&path, true).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(config.spreadsheets.strict_catalog);
        assert_eq!(config.boundaries, Config::default().boundaries);
    }

    #[test]
    fn invalid_toml_should_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "output_dir = [").unwrap();
        assert!(matches!(
            read_config_from_toml(&path, true),
            Err(error::NabisCliError::TomlError(_))
        ));
    }
}
