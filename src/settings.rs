use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{env, path::PathBuf};

/// User settings.
///
/// `Settings::load` reads an optional TOML file, then environment variables
/// with the `TRACKER__` prefix, and falls back to the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Journal location, overridden by `--journal-file`.
    pub journal_file: Option<PathBuf>,
    /// Stop the running tracker when a new one starts.
    pub single_running: bool,
    /// strftime pattern used to print times.
    pub time_format: String,
    /// Column width for descriptions in `list`.
    pub description_width: usize,
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            journal_file: None,
            single_running: true,
            time_format: "%F %T".to_string(),
            description_width: 40,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = resolve_config_path() {
            builder = builder.add_source(config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TRACKER")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.time_format.trim().is_empty() {
            return Err("time_format must not be empty".to_string());
        }
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(format!("time_format '{}' is not a valid pattern", self.time_format));
        }
        if self.description_width < 8 {
            return Err("description_width must be >= 8".to_string());
        }
        Ok(())
    }
}

/// Platform directories for config and data.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "gozque", "tracker")
}

/// `TRACKER_CONFIG_PATH` if set, the platform config location otherwise.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TRACKER_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// `config.toml` in the platform config directory, e.g.
/// `$XDG_CONFIG_HOME/tracker/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}
