// SPDX-License-Identifier: GPL-3.0-or-later

//! The arbiter's config file.
//!
//! It describes the device topology a run starts with, plus the windows and cursors that
//! exist up front. It lives at `$XDG_CONFIG_HOME/grab-arbiter/arbiter.toml` by default.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::{
    device::{DeviceId, DeviceRole, Registry},
    input::{CursorId, WindowId},
};

pub const CONFIG_FILE_NAME: &str = "arbiter.toml";

#[derive(serde::Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// A tracing filter directive, used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub windows: Vec<WindowId>,
    #[serde(default)]
    pub cursors: Vec<CursorId>,
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub role: DeviceRole,
    /// The other-role master, for masters.
    pub paired: Option<DeviceId>,
    /// The master a slave is attached to.
    pub master: Option<DeviceId>,
}

impl Config {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to deserialize config")
    }

    /// Loads the config at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Bad config at {}", path.display()))
    }

    /// Loads `path` if given, otherwise the default config file if it exists.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) => {
                info!("Loading config at {}", path.display());
                Self::load(&path)
            }
            None => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Builds the device registry this config describes.
    pub fn build_registry(&self) -> anyhow::Result<Registry> {
        let mut registry = Registry::new();

        for device in self.devices.iter() {
            // Slaves start floating and become slaves once attached.
            let role = match device.role {
                DeviceRole::Slave => DeviceRole::Floating,
                role => role,
            };
            registry
                .add_device(device.id, role)
                .with_context(|| format!("Bad device entry {:?}", device.id))?;
        }

        for device in self.devices.iter() {
            if let Some(paired) = device.paired {
                registry
                    .pair(device.id, paired)
                    .with_context(|| format!("Failed to pair {:?}", device.id))?;
            }
            if let Some(master) = device.master {
                registry
                    .attach(device.id, master)
                    .with_context(|| format!("Failed to attach {:?}", device.id))?;
            } else if device.role == DeviceRole::Slave {
                anyhow::bail!("slave device {:?} has no master", device.id);
            }
        }

        for &window in self.windows.iter() {
            registry.add_window(window);
        }
        for &cursor in self.cursors.iter() {
            registry.add_cursor(cursor);
        }

        Ok(registry)
    }
}

/// `$XDG_CONFIG_HOME/grab-arbiter/arbiter.toml`, if it exists.
pub fn default_config_path() -> Option<PathBuf> {
    xdg::BaseDirectories::with_prefix("grab-arbiter").find_config_file(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SEAT: &str = r#"
        log_filter = "grab_arbiter=debug"
        windows = [1, 10]
        cursors = [5]

        [[device]]
        id = 2
        role = "master_pointer"
        paired = 3

        [[device]]
        id = 3
        role = "master_keyboard"

        [[device]]
        id = 6
        role = "slave"
        master = 2
    "#;

    #[test]
    fn seat_config_builds_registry() -> anyhow::Result<()> {
        let config = Config::parse(SEAT)?;
        assert_eq!(config.log_filter.as_deref(), Some("grab_arbiter=debug"));

        let registry = config.build_registry()?;
        assert_eq!(registry.paired(DeviceId(3)), Some(DeviceId(2)));
        assert_eq!(registry.master_of(DeviceId(6)), Some(DeviceId(2)));
        assert!(registry.window_exists(WindowId(10)));
        assert!(registry.cursor_exists(CursorId(5)));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("log_filtr = \"debug\"").is_err());
    }

    #[test]
    fn slave_without_master_is_an_error() -> anyhow::Result<()> {
        let config = Config::parse("[[device]]\nid = 6\nrole = \"slave\"")?;
        assert!(config.build_registry().is_err());
        Ok(())
    }

    #[test]
    fn load_reads_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(SEAT.as_bytes())?;

        let config = Config::load_or_default(Some(file.path()))?;
        assert_eq!(config.devices.len(), 3);
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(Config::load(&dir.path().join(CONFIG_FILE_NAME)).is_err());
        Ok(())
    }
}
