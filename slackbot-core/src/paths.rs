// ABOUTME: Well-known filesystem locations for config and logs
// ABOUTME: Resolved through the platform's XDG/AppData conventions via `directories`

use std::path::PathBuf;

use directories::ProjectDirs;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "slackbot")
}

/// `~/.config/slackbot` on Linux; falls back to the working directory.
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default directory for rolling JSON log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}
