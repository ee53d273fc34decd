//! Transport ownership and connection lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channel::{LineReader, Mailbox};
use crate::transport::Transport;
use crate::{Error, Result};

/// Lifecycle of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, never opened.
    Idle,
    /// Transport is open.
    Open,
    /// Disconnected or disposed.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

struct Inner {
    transport: Option<Box<dyn Transport>>,
    reader: Option<LineReader>,
}

/// Owns the transport of one device.
///
/// The inner lock doubles as the in-flight gate: every write path holds it from
/// the moment it checks the state until its write (and any reply wait) is done,
/// so at most one operation touches the transport at a time.
///
/// The lifecycle state sits behind its own lock, only ever written while the
/// inner lock is held, so status reads never wait behind a command.
pub struct ConnectionManager {
    port: String,
    state: Mutex<ConnectionState>,
    disposed: AtomicBool,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            port: transport.name().to_string(),
            state: Mutex::new(ConnectionState::Idle),
            disposed: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                transport: Some(transport),
                reader: None,
            }),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Open the transport and start the line reader feeding `mailbox`.
    ///
    /// On failure the state is left as it was.
    pub fn connect(&self, mailbox: Arc<Mailbox>) -> Result<()> {
        let mut inner = self.inner.lock();
        if self.state() == ConnectionState::Open {
            return Ok(());
        }
        let Some(transport) = inner.transport.as_mut() else {
            return Err(Error::Disposed);
        };

        transport.open()?;

        let reader = transport
            .line_source()
            .and_then(|source| LineReader::spawn(&self.port, source, mailbox));
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                if let Err(close_err) = transport.close() {
                    debug!("Closing {} after failed connect: {}", self.port, close_err);
                }
                return Err(e);
            }
        };

        inner.reader = Some(reader);
        self.set_state(ConnectionState::Open);
        info!("Connected to {}", self.port);
        Ok(())
    }

    /// Close an open connection.
    ///
    /// `farewell` runs first, under the same lock, with the transport still open;
    /// its failure is logged and does not stop the close.
    pub fn disconnect<F>(&self, farewell: Option<F>) -> Result<()>
    where
        F: FnOnce(&mut dyn Transport) -> Result<()>,
    {
        let mut inner = self.inner.lock();
        if self.state() != ConnectionState::Open {
            return Err(Error::NotConnected);
        }

        if let (Some(farewell), Some(transport)) = (farewell, inner.transport.as_mut()) {
            if let Err(e) = farewell(transport.as_mut()) {
                warn!("Final frame to {} failed: {}", self.port, e);
            }
        }

        self.shutdown(&mut inner);
        info!("Disconnected from {}", self.port);
        Ok(())
    }

    /// Release the transport. Safe to call any number of times.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if self.state() == ConnectionState::Open {
            self.shutdown(&mut inner);
        }
        if inner.transport.take().is_some() {
            self.disposed.store(true, Ordering::Release);
            self.set_state(ConnectionState::Closed);
            debug!("Released {}", self.port);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run `f` with exclusive use of the open transport.
    ///
    /// Callers queue on the lock in arrival order; a closed connection yields
    /// `Error::NotConnected` without calling `f`.
    pub fn exclusive<T>(&self, f: impl FnOnce(&mut dyn Transport) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        if self.state() != ConnectionState::Open {
            return Err(Error::NotConnected);
        }
        let transport = inner.transport.as_mut().ok_or(Error::Disposed)?;
        f(transport.as_mut())
    }

    fn shutdown(&self, inner: &mut Inner) {
        if let Some(transport) = inner.transport.as_mut() {
            if let Err(e) = transport.close() {
                warn!("Failed to close {}: {}", self.port, e);
            }
        }
        if let Some(mut reader) = inner.reader.take() {
            reader.stop();
        }
        self.set_state(ConnectionState::Closed);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
