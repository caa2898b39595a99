use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "harmony_config.json";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fixed backfill page size: messages per subscription window.
    pub page_size: usize,
    /// How long a send may stay unresolved before the optimistic message is
    /// marked failed.
    pub send_timeout_ms: u64,
    /// Compatibility switch: a successful retry clears the failed flag on
    /// every message sharing the retried message's exact timestamp instead
    /// of matching its id.
    pub retry_matches_by_timestamp: bool,
    pub toast_auto_dismiss_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            send_timeout_ms: 15_000,
            retry_matches_by_timestamp: false,
            toast_auto_dismiss_ms: 4_000,
        }
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<AppConfig> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load the config file from `data_dir`, falling back to defaults when the
/// file is absent or unreadable. A corrupt file is never fatal.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    if !path.exists() {
        return AppConfig::default();
    }
    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "invalid config file, using defaults");
            AppConfig::default()
        }
    }
}
