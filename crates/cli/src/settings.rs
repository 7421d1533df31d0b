// Configuration loading: defaults, optional TOML file, SCS_* environment

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use scs_core::config::SupervisorConfig;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "SCS";
const CONFIG_FILE_NAME: &str = "scs.toml";

/// `<config dir>/scs.toml` for the current user, if a home directory exists
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "scs").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load the supervisor configuration
///
/// An explicit `path` must exist; the default path is optional.
pub fn load(path: Option<&Path>) -> Result<SupervisorConfig> {
    let (file, required) = match path {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (default_config_path(), false),
    };

    let mut builder = Config::builder()
        .add_source(Config::try_from(&SupervisorConfig::default()).context("Invalid defaults")?);

    if let Some(file) = &file {
        let name = file.to_string_lossy();
        builder = builder.add_source(File::new(&name, FileFormat::Toml).required(required));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("launcher_prefix_args")
            .with_list_parse_key("control_prefix_args"),
    );

    let mut config: SupervisorConfig = builder
        .build()
        .context("Failed to load configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    config.workdir = expand_path(&config.workdir);
    Ok(config)
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(&raw).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scs.toml");
        fs::write(
            &path,
            r#"
pool_limit = 4
broadcast_timeout_ms = 2500
launcher_program = "/opt/celery/bin/celeryd-multi"

[default_broker]
hostname = "mq.internal"
"#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.pool_limit, 4);
        assert_eq!(config.broadcast_timeout(), std::time::Duration::from_millis(2500));
        assert_eq!(config.launcher_program, "/opt/celery/bin/celeryd-multi");
        assert_eq!(config.default_broker.hostname, "mq.internal");
        assert_eq!(config.default_broker.port, 5672);
        assert_eq!(config.pidfile_template, "celeryd@%n.pid");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_path(Path::new("~/scs"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("scs"));
    }
}
