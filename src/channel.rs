//! Command/response exchange with the device.
//!
//! The protocol has no message ids: the first line that arrives after a
//! command is sent is taken as its answer. That only holds while a single
//! request is outstanding, so every exchange runs under the connection's
//! transport lock, from the write through the wait.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::connection::ConnectionManager;
use crate::protocol::{clean_line, decode_state_line, encode_command, Command, DeviceState};
use crate::Result;

/// Default wait for a state-query reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Single-slot hand-off between the line reader and the one waiting command.
#[derive(Default)]
pub struct Mailbox {
    waiter: Mutex<Option<SyncSender<String>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register as the waiter for the next line, replacing any previous one.
    pub fn arm(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::sync_channel(1);
        *self.waiter.lock() = Some(tx);
        rx
    }

    pub fn disarm(&self) {
        self.waiter.lock().take();
    }

    /// Deliver a line to the pending waiter, if there is one.
    ///
    /// Returns false when nobody was listening and the line was dropped.
    pub fn publish(&self, line: String) -> bool {
        match self.waiter.lock().take() {
            Some(tx) => tx.try_send(line).is_ok(),
            None => false,
        }
    }
}

/// Background thread turning the transport's byte stream into lines.
pub struct LineReader {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LineReader {
    /// Spawn a reader over `source`, publishing cleaned lines to `mailbox`.
    pub fn spawn(
        port: &str,
        source: Box<dyn Read + Send>,
        mailbox: Arc<Mailbox>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let port = port.to_string();

        let handle = thread::Builder::new()
            .name(format!("adalight-reader {port}"))
            .spawn(move || reader_thread(port, source, mailbox, worker_running))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the reader and wait for the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reader_thread(
    port: String,
    source: Box<dyn Read + Send>,
    mailbox: Arc<Mailbox>,
    running: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    while running.load(Ordering::Relaxed) {
        match reader.read_until(b'\n', &mut buf) {
            // End of stream, endpoint closed
            Ok(0) => break,
            Ok(_) if buf.last() == Some(&b'\n') => {
                let raw = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();
                trace!("[{}] line: {:?}", port, raw);

                match clean_line(&raw) {
                    Some(line) => {
                        if !mailbox.publish(line) {
                            trace!("[{}] no waiter, line dropped", port);
                        }
                    }
                    None => trace!("[{}] ignoring unrecognized line", port),
                }
            }
            // Partial line at end of stream
            Ok(_) => break,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                warn!("Line reader on {} stopped: {}", port, e);
                break;
            }
        }
    }

    debug!("Line reader on {} exited", port);
}

/// Serialized command/response exchange.
///
/// Also caches the last known device state. The cache is only written while
/// the transport lock is held, so it always matches the last command sent.
pub struct CommandChannel {
    mailbox: Arc<Mailbox>,
    state: Mutex<DeviceState>,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    pub fn new() -> Self {
        Self::with_state(DeviceState::default())
    }

    /// Start from a known device state instead of "unknown".
    pub fn with_state(state: DeviceState) -> Self {
        Self {
            mailbox: Arc::new(Mailbox::new()),
            state: Mutex::new(state),
        }
    }

    /// Mailbox the connection's line reader publishes into.
    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Last known device state.
    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    /// Send a brightness-set command. Fire and forget.
    ///
    /// Values outside 0..=255 are ignored and yield `Ok(false)`.
    pub fn set_brightness(&self, connection: &ConnectionManager, value: i32) -> Result<bool> {
        let Ok(value) = u8::try_from(value) else {
            debug!("Ignoring out-of-range brightness {}", value);
            return Ok(false);
        };

        let frame = encode_command(Command::SetBrightness(value));
        connection.exclusive(|transport| {
            trace!("[{}] command: {:02X?}", transport.name(), frame);
            transport.write(&frame)?;
            self.state.lock().brightness = value;
            Ok(())
        })?;
        Ok(true)
    }

    /// Query device state, waiting up to `timeout` for the reply.
    ///
    /// A timeout returns the cached state unchanged.
    pub fn query_state(&self, connection: &ConnectionManager, timeout: Duration) -> Result<DeviceState> {
        let frame = encode_command(Command::QueryState);

        connection.exclusive(|transport| {
            let rx = self.mailbox.arm();
            trace!("[{}] command: {:02X?}", transport.name(), frame);
            if let Err(e) = transport.write(&frame) {
                self.mailbox.disarm();
                return Err(e);
            }

            let reply = rx.recv_timeout(timeout).ok();
            self.mailbox.disarm();

            let mut state = self.state.lock();
            match reply {
                Some(line) => *state = decode_state_line(&line, *state),
                None => debug!("[{}] state query timed out after {:?}", transport.name(), timeout),
            }
            Ok(*state)
        })
    }
}
