//! Byte-stream transport the device talks over.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, warn};

use crate::{Error, Result};

#[cfg(test)]
pub(crate) mod memory;

/// Adalight firmware default speed.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout used when probing for the announce line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1500);

/// Poll interval of the background line reader.
pub(crate) const LINE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Give the board time to come out of the DTR reset.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// A raw byte-stream endpoint.
pub trait Transport: Send {
    /// Endpoint name, e.g. `/dev/ttyUSB0`.
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Write the whole buffer and flush it.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Read one newline-terminated line, without the terminator.
    ///
    /// Fails with a timeout error if no full line arrives within the read timeout.
    fn read_line(&mut self) -> Result<String>;

    /// Independent read handle for the background line reader.
    ///
    /// Reads on the returned handle time out after a short poll interval
    /// and report end of stream once the endpoint is closed.
    fn line_source(&mut self) -> Result<Box<dyn Read + Send>>;
}

/// Names of every serial endpoint known to the host.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// Serial port transport, 8-N-1 without flow control.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: &str, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
            port: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Error::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let mut port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|source| Error::Open {
                port: self.port_name.clone(),
                source,
            })?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!("Failed to set DTR on {}: {}", self.port_name, e);
        }

        thread::sleep(SETTLE_DELAY);

        debug!("Opened {} at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(bytes.len())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.read_timeout = timeout;
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout)?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.read_timeout;
        read_line_until(self.port_mut()?, deadline)
    }

    fn line_source(&mut self) -> Result<Box<dyn Read + Send>> {
        let mut reader = self.port_mut()?.try_clone()?;
        reader.set_timeout(LINE_POLL_INTERVAL)?;
        Ok(Box::new(reader))
    }
}

/// Read bytes up to a newline, giving up at `deadline`.
///
/// End of stream means the endpoint went away and is reported as an error.
fn read_line_until<R: Read + ?Sized>(reader: &mut R, deadline: Instant) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "endpoint closed").into())
            }
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no line received").into());
        }
    }

    Ok(String::from_utf8_lossy(&line)
        .trim_end_matches('\r')
        .to_string())
}
