use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::parser::DEFAULT_MAX_LINE_LEN;

const APP_DIR: &str = "helios_dashboard";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Port read timeout. Also bounds how long a disconnect waits for the
    /// reader thread to notice the stop flag.
    pub timeout_ms: u64,
    /// Appended to every outgoing command.
    pub line_ending: String,
    pub max_line_len: usize,
    /// Connect to the first detected port on startup.
    pub auto_connect: bool,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: 100,
            line_ending: "\n".to_string(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            auto_connect: true,
        }
    }
}

impl SerialSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn data_bits(&self) -> serialport::DataBits {
        match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        }
    }

    pub fn stop_bits(&self) -> serialport::StopBits {
        match self.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        }
    }

    /// Builder for opening `port` with these settings.
    pub fn builder(&self, port: &str) -> serialport::SerialPortBuilder {
        serialport::new(port, self.baud_rate)
            .data_bits(self.data_bits())
            .parity(self.parity.into())
            .stop_bits(self.stop_bits())
            .timeout(self.timeout())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub theme: Theme,
    pub poll_interval_ms: u64,
    /// Points kept per field for plotting.
    pub history_len: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            poll_interval_ms: 100,
            history_len: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub console_log_path: PathBuf,
    pub record_csv: bool,
    pub csv_dir: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_log_path: PathBuf::from("serial_log.txt"),
            record_csv: false,
            csv_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial: SerialSettings,
    pub ui: UiSettings,
    pub logging: LogSettings,
}

impl Settings {
    /// Settings live in the user's config directory, falling back to the
    /// working directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(SETTINGS_FILE)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings, or use defaults if the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings file {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No settings file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ground_station_link() {
        let s = Settings::default();
        assert_eq!(s.serial.baud_rate, 9600);
        assert_eq!(s.serial.timeout(), Duration::from_millis(100));
        assert_eq!(s.ui.theme, Theme::Dark);
        assert_eq!(s.logging.console_log_path, PathBuf::from("serial_log.txt"));
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut s = Settings::default();
        s.serial.baud_rate = 115_200;
        s.ui.theme = Theme::Light;
        s.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), s);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "serial": { "baud_rate": 57600, "parity": "even" } }"#).unwrap();

        let s = Settings::load_from(&path);
        assert_eq!(s.serial.baud_rate, 57600);
        assert_eq!(s.serial.parity, Parity::Even);
        assert_eq!(s.serial.data_bits, 8);
        assert_eq!(s.ui, UiSettings::default());
    }

    #[test]
    fn missing_or_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(Settings::load_from(&missing), Settings::default());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "not json").unwrap();
        assert_eq!(Settings::load_from(&corrupt), Settings::default());
    }
}
