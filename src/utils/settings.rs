use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::Result;
use crate::utils::consts::SETTINGS_FILE;

/// Persisted user settings. Only the display name survives restarts;
/// everything else is per-invocation configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    pub username: String,
}

impl Settings {
    /// Load from `path`, or fall back to a generated `user<4 hex>` name.
    pub fn load(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(mut settings) => {
                    settings.username = sanitize_username(&settings.username);
                    settings
                }
                Err(e) => {
                    warn!("Unreadable settings file {}: {}", path.display(), e);
                    Self::generated()
                }
            },
            Err(_) => {
                debug!("No settings file at {}, generating identity", path.display());
                Self::generated()
            }
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn generated() -> Self {
        let suffix: u32 = rand::rng().random_range(0..0x10000);
        Self {
            username: format!("user{:04x}", suffix),
        }
    }
}

/// Default settings path: `$HOME/.soniclink.json`, falling back to the
/// working directory when HOME is unset.
pub fn settings_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(SETTINGS_FILE),
        None => PathBuf::from(SETTINGS_FILE),
    }
}

/// The wire format delimits fields with '|'; display names may not carry it.
pub fn sanitize_username(name: &str) -> String {
    name.replace('|', "_")
}

/// Opaque short peer identity, e.g. "a1b2c3d4e".
pub fn generate_user_id() -> String {
    let id: u64 = rand::rng().random_range(0..0x1000000000);
    format!("{:09x}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_username_shape() {
        let settings = Settings::generated();
        assert!(settings.username.starts_with("user"));
        assert_eq!(settings.username.len(), 8);
    }

    #[test]
    fn test_user_id_shape() {
        let id = generate_user_id();
        assert_eq!(id.len(), 9);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sanitize_username() {
        assert_eq!(sanitize_username("a|b"), "a_b");
        assert_eq!(sanitize_username("Alice"), "Alice");
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("soniclink-settings-{}.json", std::process::id()));
        let settings = Settings {
            username: "Alice".to_string(),
        };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path);
        assert_eq!(loaded.username, "Alice");
        let _ = std::fs::remove_file(&path);
    }
}
