//! Runtime configuration. The original tooling hardcoded the serial port,
//! the data directory and the protocol delays; here they live in a small
//! RON file next to the executable, with sensible defaults when the file
//! is absent.

use crate::capture::ProtocolTiming;
use crate::transport::SerialConnector;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the capture pipeline needs to know about its surroundings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Serial port the sensor board is attached to.
    pub port: String,
    /// Baud rate; the stock firmware talks at 115200.
    pub baud: u32,
    /// Directory patient workbooks are stored under (one subdirectory per
    /// patient id).
    pub data_dir: PathBuf,
    /// File name of the per-patient workbook.
    pub workbook_name: String,
    /// Per-line read timeout, so a silent device cannot hang a capture.
    pub read_timeout_ms: u64,
    /// Settle delay after opening the port, while the board resets.
    pub settle_ms: u64,
    /// Gap between the protocol's command bytes.
    pub command_gap_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            #[cfg(windows)]
            port: "COM4".to_string(),
            #[cfg(not(windows))]
            port: "/dev/ttyACM0".to_string(),
            baud: 115_200,
            data_dir: PathBuf::from("PacienteData"),
            workbook_name: "Lecturas.xlsx".to_string(),
            read_timeout_ms: 1000,
            settle_ms: 200,
            command_gap_ms: 50,
        }
    }
}

impl CaptureConfig {
    /// Reads a configuration file, or falls back to the defaults when the
    /// file does not exist. A file that exists but fails to parse is an
    /// error; silently ignoring a typo'd config would be worse.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        ron::de::from_str(&text).map_err(ConfigError::Parse)
    }

    /// The protocol delays as durations.
    pub fn timing(&self) -> ProtocolTiming {
        ProtocolTiming {
            settle: Duration::from_millis(self.settle_ms),
            command_gap: Duration::from_millis(self.command_gap_ms),
        }
    }

    /// A serial connector for the configured port.
    pub fn serial_connector(&self) -> SerialConnector {
        SerialConnector {
            port: self.port.clone(),
            baud: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// Returned when the configuration file cannot be read or parsed.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(io::Error),
    /// The file is not valid RON for [`CaptureConfig`].
    Parse(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read configuration: {e}"),
            ConfigError::Parse(e) => write!(f, "could not parse configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
