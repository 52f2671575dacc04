use std::{env, path::PathBuf};

use crate::DATA_DIR_ENV;

/// Root of everything the panel owns on disk. Resolution order: explicit env
/// override, the platform data directory, the temp directory as a last
/// resort for stripped-down environments.
pub fn panel_data_dir() -> PathBuf {
    if let Ok(custom) = env::var(DATA_DIR_ENV) {
        let candidate = PathBuf::from(custom.trim());
        if !candidate.as_os_str().is_empty() {
            return candidate;
        }
    }

    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("botpanel")
}

/// Working tree of the managed bot runtime (config, database, logs of the
/// supervised process itself).
pub fn managed_runtime_dir() -> PathBuf {
    panel_data_dir().join("data").join("bot")
}

/// Where downloaded panel-update payloads are staged before install.
pub fn updates_dir() -> PathBuf {
    panel_data_dir().join("updates")
}

pub fn logs_dir() -> PathBuf {
    panel_data_dir().join("logs")
}
