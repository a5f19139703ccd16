// src/infra/paths.rs — Default file locations
//
// GENBOT_HOME overrides everything: config and data then live under that
// directory. Otherwise config uses ~/.genbot/ and data uses XDG_DATA_HOME/genbot.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "genbot"))
        .as_ref()
}

fn genbot_home() -> Option<PathBuf> {
    std::env::var_os("GENBOT_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $GENBOT_HOME/ or ~/.genbot/
pub fn config_dir() -> PathBuf {
    if let Some(home) = genbot_home() {
        return home;
    }
    dirs_home().join(".genbot")
}

/// Data directory: $GENBOT_HOME/data/ or ~/.local/share/genbot/
pub fn data_dir() -> PathBuf {
    if let Some(home) = genbot_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Request statistics CSV
pub fn stats_path() -> PathBuf {
    data_dir().join("stats.csv")
}

/// Blocked usernames, one per line
pub fn blocklist_path() -> PathBuf {
    data_dir().join("blocklist.txt")
}

/// Ensure the config and data directories exist.
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
