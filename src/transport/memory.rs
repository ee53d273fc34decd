//! Scripted in-memory transport for unit tests.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Transport, LINE_POLL_INTERVAL};
use crate::protocol::{encode_command, Command};
use crate::{Error, Result};

type Responder = Box<dyn Fn(&[u8]) -> Option<String> + Send>;

/// Test-side view of a [`MemoryTransport`].
#[derive(Clone, Default)]
pub(crate) struct MemoryHandle {
    written: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    fail_writes: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl MemoryHandle {
    /// Every byte written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    /// Each write call's buffer.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Push a line to the reader side. Returns false if the transport is closed.
    pub fn inject_line(&self, line: &str) -> bool {
        match self.incoming.lock().as_ref() {
            Some(tx) => tx.send(format!("{line}\n").into_bytes()).is_ok(),
            None => false,
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

pub(crate) struct MemoryTransport {
    name: String,
    open: bool,
    fail_open: bool,
    announce: Option<String>,
    responder: Option<Responder>,
    byte_delay: Option<Duration>,
    source: Option<Receiver<Vec<u8>>>,
    handle: MemoryHandle,
}

impl MemoryTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            open: false,
            fail_open: false,
            announce: None,
            responder: None,
            byte_delay: None,
            source: None,
            handle: MemoryHandle::default(),
        }
    }

    /// Line returned by `read_line`.
    pub fn announcing(mut self, line: &str) -> Self {
        self.announce = Some(line.to_string());
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Answer state queries with `reply`.
    pub fn replying_to_queries(self, reply: &str) -> Self {
        let reply = reply.to_string();
        let query = encode_command(Command::QueryState);
        self.responding(move |bytes| (bytes == query.as_slice()).then(|| reply.clone()))
    }

    pub fn responding(mut self, f: impl Fn(&[u8]) -> Option<String> + Send + 'static) -> Self {
        self.responder = Some(Box::new(f));
        self
    }

    /// Write one byte at a time with a pause in between.
    pub fn slow_writes(mut self, delay: Duration) -> Self {
        self.byte_delay = Some(delay);
        self
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.handle.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such endpoint").into());
        }
        let (tx, rx) = mpsc::channel();
        *self.handle.incoming.lock() = Some(tx);
        self.source = Some(rx);
        self.open = true;
        self.handle.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.source = None;
            self.handle.incoming.lock().take();
            self.handle.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        if self.handle.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed").into());
        }

        match self.byte_delay {
            Some(delay) => {
                for &b in bytes {
                    self.handle.written.lock().push(b);
                    thread::sleep(delay);
                }
            }
            None => self.handle.written.lock().extend_from_slice(bytes),
        }
        self.handle.writes.lock().push(bytes.to_vec());

        if let Some(reply) = self.responder.as_ref().and_then(|f| f(bytes)) {
            self.handle.inject_line(&reply);
        }
        Ok(bytes.len())
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if !self.open {
            return Err(Error::NotConnected);
        }
        self.announce
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no line received").into())
    }

    fn line_source(&mut self) -> Result<Box<dyn Read + Send>> {
        let rx = self.source.take().ok_or(Error::NotConnected)?;
        Ok(Box::new(ChannelReader {
            rx,
            pending: Vec::new(),
        }))
    }
}

/// Reader over injected chunks; times out like a serial port when idle.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(LINE_POLL_INTERVAL) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
