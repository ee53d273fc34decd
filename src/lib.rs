//! Adalight serial LED strip driver.
//!
//! Pushes pixel frames to Adalight-compatible controllers, sends the `Adb`
//! brightness/state commands, and discovers devices by their `Ada` announce
//! line.

pub mod channel;
pub mod color;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod protocol;
pub mod scanner;
pub mod transport;

pub use color::Rgb;
pub use config::{Config, DeviceConfig};
pub use connection::ConnectionState;
pub use device::AdalightDevice;
pub use error::{Error, Result};
pub use protocol::DeviceState;
pub use scanner::scan;
pub use transport::{SerialTransport, Transport};
