// src/infra/paths.rs: Path management
//
// All paths respect the VERITE_HOME environment variable for isolation.
// When VERITE_HOME is set, config and kept harness workspaces live under it.
// When unset, ~/.verite/ is used.

use std::path::PathBuf;

fn verite_home() -> Option<PathBuf> {
    std::env::var_os("VERITE_HOME").map(PathBuf::from)
}

/// Home directory, or the system temp dir when no home can be determined.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

/// Configuration directory: $VERITE_HOME/ or ~/.verite/
pub fn config_dir() -> PathBuf {
    if let Some(home) = verite_home() {
        return home;
    }
    dirs_home().join(".verite")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Where harness workspaces are moved when `harness.keep_workspace` is set.
pub fn kept_workspaces_dir() -> PathBuf {
    config_dir().join("workspaces")
}
