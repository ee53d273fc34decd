//! Error types for the Adalight serial driver.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an Adalight device.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial endpoint could not be opened (missing, busy, no permission).
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Serial port communication error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires an open connection.
    #[error("Device is not connected")]
    NotConnected,

    /// Device has been disposed and cannot be reopened.
    #[error("Device has been disposed")]
    Disposed,

    /// A strip needs at least one LED.
    #[error("Invalid LED count: {0}")]
    InvalidLedCount(usize),

    /// Pixel index past the end of the strip.
    #[error("Pixel {index} out of range (strip has {len} LEDs)")]
    PixelOutOfRange { index: usize, len: usize },

    /// Color string could not be parsed.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Configuration file is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
