use std::path::PathBuf;

pub const SETTINGS_FILE_NAME: &str = "appsettings.json";
pub const SETTINGS_PATH_ENV: &str = "S3WEBURL_SETTINGS";

const APP_DIR_NAME: &str = "s3-weburl";

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Per-user settings directory: `%APPDATA%` on Windows, `Application
/// Support` on macOS, `$XDG_CONFIG_HOME` (or `~/.config`) elsewhere.
pub fn app_config_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "windows") {
        env_dir("APPDATA")
            .or_else(|| env_dir("USERPROFILE").map(|home| home.join("AppData").join("Roaming")))
    } else if cfg!(target_os = "macos") {
        env_dir("HOME").map(|home| home.join("Library").join("Application Support"))
    } else {
        env_dir("XDG_CONFIG_HOME").or_else(|| env_dir("HOME").map(|home| home.join(".config")))
    };
    base.map(|dir| dir.join(APP_DIR_NAME))
}

fn exe_dir_settings_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(SETTINGS_FILE_NAME))
}

/// Candidate settings files, most specific first.
pub fn settings_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(explicit) = std::env::var(SETTINGS_PATH_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        candidates.push(PathBuf::from(explicit));
    }
    if let Some(path) = exe_dir_settings_path() {
        candidates.push(path);
    }
    if let Some(dir) = app_config_dir() {
        candidates.push(dir.join(SETTINGS_FILE_NAME));
    }
    candidates
}

/// First candidate that exists on disk.
pub fn settings_path() -> Result<PathBuf, String> {
    let candidates = settings_candidates();
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| {
            let searched = candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{SETTINGS_FILE_NAME} not found (searched: {searched})")
        })
}
