//! Loading and first-run creation of `config.toml`.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mogbox")
        .join("config.toml")
}

/// Loads and sanitizes the config, writing defaults on first run.
/// Falls back to defaults on any read or parse failure.
pub fn load_or_create_config(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        write_default_config(path);
        return Config::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!("Failed to read config {}: {}", path.display(), err);
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&contents) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!("Failed to parse config {}: {}", path.display(), err);
            Config::default()
        }
    }
}

fn write_default_config(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    if let Err(err) = std::fs::create_dir_all(parent) {
        warn!(
            "Failed to create config directory {}: {}",
            parent.display(),
            err
        );
        return;
    }
    let serialized = match toml::to_string(&Config::default()) {
        Ok(serialized) => serialized,
        Err(err) => {
            warn!("Failed to serialize default config: {}", err);
            return;
        }
    };
    if let Err(err) = std::fs::write(path, serialized) {
        warn!("Failed to write config {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_path(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after UNIX_EPOCH")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "mogbox_config_{}_{}_{}",
            test_name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_first_run_writes_default_config() {
        let path = unique_temp_path("first_run").join("config.toml");
        let config = load_or_create_config(&path);
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = load_or_create_config(&path);
        assert_eq!(reloaded, Config::default());

        let _ = std::fs::remove_dir_all(path.parent().expect("config path should have a parent"));
    }

    #[test]
    fn test_loaded_config_is_sanitized() {
        let dir = unique_temp_path("sanitized");
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[output]\nsample_rate_hz = 999999\n")
            .expect("config should be writable");

        let config = load_or_create_config(&path);
        assert_eq!(config.output.sample_rate_hz, 192_000);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = unique_temp_path("unparseable");
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let path = dir.join("config.toml");
        std::fs::write(&path, "not valid toml [").expect("config should be writable");

        assert_eq!(load_or_create_config(&path), Config::default());

        let _ = std::fs::remove_dir_all(dir);
    }
}
