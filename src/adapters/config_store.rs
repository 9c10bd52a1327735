use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

const APP_DIR: &str = "solo-server";

/// TOML-based configuration store with OS-specific paths.
pub struct TomlConfigStore {
    data_dir: PathBuf,
}

impl TomlConfigStore {
    /// Create a new TomlConfigStore.
    /// Uses OS-specific application config directories.
    pub fn new() -> Result<Self, DomainError> {
        let store = Self::with_data_dir(Self::get_data_dir()?);
        debug!(data_dir = ?store.data_dir, "ConfigStore initialized");
        Ok(store)
    }

    /// Store rooted at an explicit directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Get the OS-specific application config directory.
    /// - macOS: ~/Library/Application Support/solo-server/
    /// - Windows: %APPDATA%\solo-server\
    /// - Linux: ~/.config/solo-server/
    fn get_data_dir() -> Result<PathBuf, DomainError> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR))
            .ok_or_else(|| DomainError::Config("Could not find application config directory".to_string()))
    }

    /// Get the OS-specific log directory.
    /// - macOS: ~/Library/Application Support/solo-server/logs/
    /// - Windows: %LOCALAPPDATA%\solo-server\logs\
    /// - Linux: ~/.local/share/solo-server/logs/
    fn get_logs_dir(&self) -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            self.data_dir.join("logs")
        }

        #[cfg(target_os = "windows")]
        {
            dirs::data_local_dir()
                .map(|p| p.join(APP_DIR).join("logs"))
                .unwrap_or_else(|| self.data_dir.join("logs"))
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs::data_dir()
                .map(|p| p.join(APP_DIR).join("logs"))
                .unwrap_or_else(|| self.data_dir.join("logs"))
        }
    }
}

/// The file holds credentials, so keep it private to the user.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), DomainError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), DomainError> {
    Ok(())
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let config_path = self.config_path();

        if config_path.exists() {
            debug!(path = ?config_path, "Loading configuration");
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&content)?;
            debug!(path = ?config_path, "Configuration loaded");
            Ok(config)
        } else {
            info!(path = ?config_path, "Configuration file not found, creating default");
            let config = AppConfig::new();
            if let Err(e) = self.save(&config) {
                warn!(error = %e, "Could not write default configuration");
            }
            Ok(config)
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let config_path = self.config_path();
        fs::create_dir_all(&self.data_dir)?;

        let content = toml::to_string_pretty(config)?;
        let tmp_path = config_path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &config_path)?;

        info!(path = ?config_path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    fn logs_dir(&self) -> PathBuf {
        self.get_logs_dir()
    }
}
