//! Platform-specific paths

use std::path::PathBuf;

const APP_DIR: &str = "SlatePass";

/// Get the platform-specific data directory
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\SlatePass
/// - macOS: ~/Library/Application Support/SlatePass
/// - Linux/Other: ~/.local/share/SlatePass
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Default location of `slatepass.toml`
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("slatepass.toml")
}

/// Default file backing the local store
pub fn get_default_local_store_path() -> PathBuf {
    get_data_dir().join("local.json")
}

/// Default file backing the remote store
pub fn get_default_remote_store_path() -> PathBuf {
    get_data_dir().join("remote.json")
}

/// Ensure the data directory exists, creating it if necessary
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
