use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(std::io::Error),
    #[error("failed to write config file: {0}")]
    Write(std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub control: Control,
    pub relay: Relay,
    pub probe: Probe,
}

/// Request/reply endpoint for client registrations.
#[derive(Debug, Serialize, Deserialize)]
pub struct Control {
    pub bind: String,
    pub port: u16,
}

/// The two relay endpoints: workers publish into `frontend_port`,
/// subscribers read from `backend_port`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Relay {
    pub bind: String,
    pub frontend_port: u16,
    pub backend_port: u16,
}

/// Probe pacing shared by every polling worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct Probe {
    /// Minimum seconds between any two probe attempts, process-wide.
    pub min_interval_secs: u64,
    /// Per-attempt TCP connect timeout.
    pub connect_timeout_secs: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/server.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/server.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: Control { bind: "*".into(), port: 5000 },
            relay: Relay { bind: "*".into(), frontend_port: 4998, backend_port: 4999 },
            probe: Probe { min_interval_secs: 1, connect_timeout_secs: 5 },
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Control")?;
        write_1(f, "Bind Address", &self.control.bind)?;
        write_1(f, "Port", &self.control.port)?;
        write_title_1(f, "Relay")?;
        write_1(f, "Bind Address", &self.relay.bind)?;
        write_1(f, "Frontend Port", &self.relay.frontend_port)?;
        write_1(f, "Backend Port", &self.relay.backend_port)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Min Interval (s)", &self.probe.min_interval_secs)?;
        write_1(f, "Connect Timeout (s)", &self.probe.connect_timeout_secs)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/server.toml
    ///  or the specified path, with a .toml extension, if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.control.port, 5000);
        assert!(path.exists());

        // second load reads the file just written
        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.relay.frontend_port, config.relay.frontend_port);
    }

    #[test]
    fn extension_is_normalized_to_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.conf");

        Config::from_config(Some(&path)).unwrap();
        assert!(dir.path().join("server.toml").exists());
    }

    #[test]
    fn partial_overrides_are_not_accepted_silently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "[control]\nbind = \"*\"\nport = 6001\n").unwrap();

        // missing sections are a parse error, not silent defaults
        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::Parse(_))));
    }
}
