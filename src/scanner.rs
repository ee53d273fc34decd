//! Device discovery by probing every serial endpoint for the announce line.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::protocol::{is_announce, DeviceState};
use crate::transport::{
    available_ports, SerialTransport, Transport, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT,
};
use crate::Result;

/// Probe every serial port on the host.
///
/// The announce line carries no details, so every found device maps to a
/// zeroed [`DeviceState`] ("unknown"); query the device for the real values.
pub fn scan() -> BTreeMap<String, DeviceState> {
    let ports = match available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            return BTreeMap::new();
        }
    };

    scan_endpoints(ports, |name| {
        Box::new(SerialTransport::new(name, DEFAULT_BAUD_RATE).with_read_timeout(DEFAULT_READ_TIMEOUT))
    })
}

/// Probe the given endpoints, building each transport with `connect`.
///
/// Endpoints that fail to open, stay silent, or announce something else are
/// left out; a failure on one never stops the rest.
pub fn scan_endpoints<I, F>(endpoints: I, mut connect: F) -> BTreeMap<String, DeviceState>
where
    I: IntoIterator<Item = String>,
    F: FnMut(&str) -> Box<dyn Transport>,
{
    let mut found = BTreeMap::new();

    for endpoint in endpoints {
        let mut transport = connect(&endpoint);
        match probe(transport.as_mut()) {
            Ok(true) => {
                info!("Found Adalight device on {}", endpoint);
                found.insert(endpoint, DeviceState::default());
            }
            Ok(false) => debug!("{} did not announce itself", endpoint),
            Err(e) => debug!("Skipping {}: {}", endpoint, e),
        }
    }

    found
}

fn probe(transport: &mut dyn Transport) -> Result<bool> {
    transport.open()?;

    let announced = transport
        .set_read_timeout(DEFAULT_READ_TIMEOUT)
        .and_then(|_| transport.read_line())
        .map(|line| is_announce(&line));

    if let Err(e) = transport.close() {
        debug!("Failed to close {}: {}", transport.name(), e);
    }

    announced
}
