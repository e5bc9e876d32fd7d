use std::path::{Path, PathBuf};

/// Returns the estate client directory (~/.estate)
pub fn estate_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".estate")
}

/// Returns the config.json path
pub fn config_json_path() -> PathBuf {
    estate_dir().join("config.json")
}

/// Returns the persisted session slot (auth.json)
pub fn session_json_path() -> PathBuf {
    estate_dir().join("auth.json")
}

/// Loads a JSON file
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
}
