mod models;

use std::{fs, path::Path, sync::OnceLock};

pub use models::{DEFAULT_PROGRESS_STEP_BYTES, Settings}; // Re-export the model type to callers.

/// Env var naming a settings file that replaces the bundled one.
pub const SETTINGS_PATH_ENV: &str = "VM_INSTALLER_SETTINGS";

/// Single, module-private cache (set exactly once).
static CACHE: OnceLock<Settings> = OnceLock::new();

// ---- Public API (serde hidden from callers) ----

/// Parse settings from a JSON file without touching the cache.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let data = fs::read_to_string(path).map_err(SettingsError::Io)?;
    load_from_json_str(&data)
}

/// Parse settings from a JSON string. Missing keys fall back to defaults.
pub fn load_from_json_str(json: &str) -> Result<Settings, SettingsError> {
    serde_json::from_str(json).map_err(SettingsError::Json)
}

/// Initialize from a JSON file path.
pub fn init_from_file(path: impl AsRef<Path>) -> Result<&'static Settings, SettingsError> {
    install(load_from_file(path)?)
}

/// Initialize from a JSON string.
pub fn init_from_json_str(json: &str) -> Result<&'static Settings, SettingsError> {
    install(load_from_json_str(json)?)
}

/// Initialize from the file named by `var`, if the variable is set.
pub fn init_from_env(var: &str) -> Result<&'static Settings, SettingsError> {
    let path = std::env::var(var).map_err(|_| SettingsError::MissingEnv(var.to_string()))?;
    init_from_file(path)
}

/// Borrow the cached settings.
pub fn get() -> Result<&'static Settings, SettingsError> {
    CACHE.get().ok_or(SettingsError::NotInitialized)
}

fn install(settings: Settings) -> Result<&'static Settings, SettingsError> {
    CACHE
        .set(settings)
        .map_err(|_| SettingsError::AlreadyInitialized)?;
    get()
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("settings are not initialized")]
    NotInitialized,
    #[error("settings already initialized")]
    AlreadyInitialized,
    #[error("missing env var: {0}")]
    MissingEnv(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
