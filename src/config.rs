use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_BAUD_RATE;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(data).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(Error::Config("no devices configured".to_string()));
        }
        for device in &self.devices {
            if device.led_count == 0 {
                return Err(Error::Config(format!("{}: led_count must be at least 1", device.port)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub port: String,
    pub led_count: usize,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How long a state query waits for the reply.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Blank the strip before closing the port.
    #[serde(default = "default_true")]
    pub reset_on_disconnect: bool,
}

impl DeviceConfig {
    pub fn new(port: &str, led_count: usize) -> Self {
        Self {
            port: port.to_string(),
            led_count,
            baud_rate: default_baud_rate(),
            response_timeout_ms: default_response_timeout_ms(),
            reset_on_disconnect: true,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_response_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}
