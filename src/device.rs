//! Device-facing API for one Adalight strip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::channel::CommandChannel;
use crate::color::Rgb;
use crate::config::DeviceConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::protocol::{build_adalight_frame, DeviceState};
use crate::transport::{SerialTransport, Transport};
use crate::{Error, Result};

/// An Adalight LED strip on a serial port.
///
/// All methods take `&self`; share the device across threads behind an `Arc`.
pub struct AdalightDevice {
    config: DeviceConfig,
    connection: ConnectionManager,
    channel: CommandChannel,
    matrix: Mutex<Vec<Rgb>>,
    pushing: AtomicBool,
}

impl AdalightDevice {
    /// Create a device on the configured serial port. Does not open it.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let transport = SerialTransport::new(&config.port, config.baud_rate);
        Self::with_transport(config, Box::new(transport))
    }

    /// Create a device over an arbitrary transport.
    pub fn with_transport(config: DeviceConfig, transport: Box<dyn Transport>) -> Result<Self> {
        if config.led_count == 0 {
            return Err(Error::InvalidLedCount(0));
        }

        Ok(Self {
            matrix: Mutex::new(vec![Rgb::BLACK; config.led_count]),
            connection: ConnectionManager::new(transport),
            channel: CommandChannel::new(),
            pushing: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn port(&self) -> &str {
        self.connection.port()
    }

    pub fn led_count(&self) -> usize {
        self.config.led_count
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Open the port and start listening for device lines.
    pub fn connect(&self) -> Result<()> {
        self.connection.connect(self.channel.mailbox())
    }

    /// Close the port, first blanking the strip if `reset_strip` is set.
    ///
    /// Fails with `Error::NotConnected` if the device is not open.
    pub fn disconnect(&self, reset_strip: bool) -> Result<()> {
        let blank = |transport: &mut dyn Transport| -> Result<()> {
            let frame = {
                let mut matrix = self.matrix.lock();
                matrix.fill(Rgb::BLACK);
                build_adalight_frame(&matrix)
            };
            transport.write(&frame)?;
            debug!("Blanked {} LEDs on {}", self.config.led_count, self.port());
            Ok(())
        };

        self.connection.disconnect(reset_strip.then_some(blank))
    }

    /// Release the port. Further calls do nothing.
    pub fn dispose(&self) {
        self.connection.dispose();
    }

    pub fn set_pixel(&self, index: usize, color: Rgb) -> Result<()> {
        let mut matrix = self.matrix.lock();
        let len = matrix.len();
        let pixel = matrix
            .get_mut(index)
            .ok_or(Error::PixelOutOfRange { index, len })?;
        *pixel = color;
        Ok(())
    }

    /// Replace the matrix from position 0.
    ///
    /// Positions past the end of `colors` become black; extra colors are ignored.
    pub fn set_pixels(&self, colors: &[Rgb]) {
        let mut matrix = self.matrix.lock();
        for (i, pixel) in matrix.iter_mut().enumerate() {
            *pixel = colors.get(i).copied().unwrap_or(Rgb::BLACK);
        }
    }

    pub fn fill(&self, color: Rgb) {
        self.matrix.lock().fill(color);
    }

    pub fn clear(&self) {
        self.fill(Rgb::BLACK);
    }

    /// Snapshot of the current matrix.
    pub fn pixels(&self) -> Vec<Rgb> {
        self.matrix.lock().clone()
    }

    /// Push the current matrix to the strip.
    ///
    /// Returns `Ok(false)` without writing if another push is still in flight.
    pub fn update(&self) -> Result<bool> {
        if self
            .pushing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            trace!("[{}] push in flight, frame skipped", self.port());
            return Ok(false);
        }

        let result = self.connection.exclusive(|transport| {
            let frame = build_adalight_frame(&self.matrix.lock());

            if tracing::enabled!(tracing::Level::TRACE) {
                let hex: String = frame
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                trace!("[{}] frame ({} bytes): {}", transport.name(), frame.len(), hex);
            }

            transport.write(&frame)
        });

        self.pushing.store(false, Ordering::Release);
        result.map(|_| true)
    }

    /// Set global brightness. Values outside 0..=255 are ignored (`Ok(false)`).
    pub fn set_brightness(&self, value: i32) -> Result<bool> {
        self.channel.set_brightness(&self.connection, value)
    }

    /// Ask the device for its state.
    ///
    /// Waits up to `timeout` (the configured response timeout if `None`). A
    /// missing reply, or a closed connection, returns the last known state.
    pub fn query_state(&self, timeout: Option<Duration>) -> DeviceState {
        let timeout = timeout.unwrap_or_else(|| self.config.response_timeout());

        self.channel
            .query_state(&self.connection, timeout)
            .unwrap_or_else(|e| {
                debug!("State query on {} failed: {}", self.port(), e);
                self.channel.state()
            })
    }

    /// Last known device state. Never waits on the port.
    pub fn state(&self) -> DeviceState {
        self.channel.state()
    }

    pub fn brightness(&self) -> u8 {
        self.channel.state().brightness
    }
}

impl Drop for AdalightDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}
