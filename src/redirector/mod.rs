// src/redirector/mod.rs
//
// Redirector: bridges one serial line and one TCP connection.
//
// Three activities run per session:
// - reader ("serial->socket" thread): serial -> escape -> network
// - poller ("status line poll" thread): periodic modem status check
// - writer (the thread that called start): network -> filter -> serial
//
// All network writes go through the shared NetworkWriter lock. The control
// channel sits behind its own mutex and is never locked while holding the
// network write lock. stop() is the only place the socket is shut down; the
// file descriptors close when the Redirector is dropped.

mod lifecycle;

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::io::{ControlChannel, IoError, NetworkWriter, SerialLine};

pub use lifecycle::Lifecycle;
use lifecycle::LifecycleCell;

/// Interval between modem status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Read timeout on the network side, bounds how long the writer loop waits
/// before re-checking the lifecycle
pub const NETWORK_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Maximum bytes taken from the network per read
pub const CHUNK_SIZE: usize = 1024;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Workers {
    reader: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    /// Dropping this wakes the poller
    poll_cancel: Option<Sender<()>>,
    /// Threads that belong to this session (reader, poller, writer)
    activities: Vec<ThreadId>,
    writer: Option<ThreadId>,
    /// Handle of an activity that ran stop() itself, joined by start()
    exited: Vec<JoinHandle<()>>,
}

pub struct Redirector {
    device: String,
    peer: String,
    /// Inbound side of the socket, read only by the writer loop
    stream: TcpStream,
    network: Arc<NetworkWriter>,
    codec: Mutex<Box<dyn ControlChannel>>,
    /// Reader and writer serial handles, taken by start()
    serial: Mutex<Option<(Box<dyn SerialLine>, Box<dyn SerialLine>)>>,
    lifecycle: LifecycleCell,
    workers: Mutex<Workers>,
}

impl Redirector {
    /// Bind a serial line and an accepted connection into a session.
    ///
    /// `make_channel` receives the control handle of the serial line and the
    /// network write path, and builds the control channel for the session.
    pub fn new<F>(
        serial: Box<dyn SerialLine>,
        stream: TcpStream,
        make_channel: F,
    ) -> Result<Self, IoError>
    where
        F: FnOnce(Box<dyn SerialLine>, Arc<NetworkWriter>) -> io::Result<Box<dyn ControlChannel>>,
    {
        let device = serial.name();
        let network =
            NetworkWriter::new(&stream).map_err(|e| IoError::connection("tcp", e.to_string()))?;
        let peer = network.label().to_string();

        stream
            .set_read_timeout(Some(NETWORK_READ_TIMEOUT))
            .map_err(|e| IoError::connection(&peer, e.to_string()))?;

        let writer_serial = serial.try_clone()?;
        let control_serial = serial.try_clone()?;
        let codec = make_channel(control_serial, network.clone())
            .map_err(|e| IoError::write(&peer, e.to_string()))?;

        tracing::debug!(
            "[redirector] {} <-> {} using {}",
            device,
            peer,
            codec.protocol()
        );

        Ok(Self {
            device,
            peer,
            stream,
            network,
            codec: Mutex::new(codec),
            serial: Mutex::new(Some((serial, writer_serial))),
            lifecycle: LifecycleCell::new(),
            workers: Mutex::new(Workers::default()),
        })
    }

    pub fn state(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send bytes to the peer without escaping, serialized with bridged data.
    pub fn write(&self, data: &[u8]) -> io::Result<()> {
        self.network.send(data)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run the session. Spawns the reader and poller threads and runs the
    /// writer loop on the calling thread until the session ends.
    ///
    /// Calling it on a session that already ran, or was stopped before it
    /// started, returns immediately.
    pub fn start(self: &Arc<Self>) -> Result<(), IoError> {
        let writer_serial = {
            let mut workers = lock(&self.workers);
            if !self.lifecycle.begin() {
                return Ok(());
            }
            let handles = lock(&self.serial).take();
            let Some((reader_serial, writer_serial)) = handles else {
                self.lifecycle.writer_finished();
                drop(workers);
                self.stop();
                return Ok(());
            };

            let current = thread::current().id();
            workers.activities.push(current);
            workers.writer = Some(current);

            if let Err(e) = self.spawn_activities(&mut workers, reader_serial) {
                tracing::error!("[redirector] failed to start session threads: {}", e);
                self.lifecycle.writer_finished();
                drop(workers);
                self.stop();
                return Err(IoError::connection(&self.peer, e.to_string()));
            }
            writer_serial
        };

        tracing::debug!("[redirector] bridging {} <-> {}", self.device, self.peer);
        self.writer_loop(writer_serial);
        self.lifecycle.writer_finished();
        self.stop();
        // another activity may have won stop() and still be joining
        self.lifecycle.wait_stopped();

        // an activity that won stop() holds the session until it returns
        let exited = std::mem::take(&mut lock(&self.workers).exited);
        for handle in exited {
            let name = handle.thread().name().unwrap_or("activity").to_string();
            if handle.join().is_err() {
                tracing::error!("[redirector] {} thread panicked", name);
            }
        }
        Ok(())
    }

    fn spawn_activities(
        self: &Arc<Self>,
        workers: &mut Workers,
        reader_serial: Box<dyn SerialLine>,
    ) -> io::Result<()> {
        let reader = {
            let this = Arc::clone(self);
            thread::Builder::new()
                .name("serial->socket".to_string())
                .spawn(move || this.reader_loop(reader_serial))?
        };
        workers.activities.push(reader.thread().id());
        workers.reader = Some(reader);

        let (cancel_tx, cancel_rx) = mpsc::channel();
        let poller = {
            let this = Arc::clone(self);
            thread::Builder::new()
                .name("status line poll".to_string())
                .spawn(move || this.poller_loop(cancel_rx))?
        };
        workers.activities.push(poller.thread().id());
        workers.poller = Some(poller);
        workers.poll_cancel = Some(cancel_tx);
        Ok(())
    }

    /// End the session. Safe to call any number of times from any thread,
    /// including the session's own activities.
    ///
    /// The first call shuts the socket down, joins the reader and poller and
    /// waits for the writer loop before reporting Stopped. Later calls from
    /// session activities return at once; later calls from other threads
    /// block until the session is Stopped.
    pub fn stop(&self) {
        if !self
            .lifecycle
            .transition(Lifecycle::Running, Lifecycle::Stopping)
        {
            if self.lifecycle.transition(Lifecycle::Idle, Lifecycle::Stopped) {
                tracing::debug!("[redirector] stopped before start");
                return;
            }
            if !self.on_activity_thread() {
                self.lifecycle.wait_stopped();
            }
            return;
        }

        tracing::debug!("[redirector] stopping");
        if let Err(e) = self.network.shutdown() {
            tracing::debug!("[redirector] shutdown {}: {}", self.peer, e);
        }

        let (reader, poller, writer) = {
            let mut workers = lock(&self.workers);
            workers.poll_cancel.take();
            (workers.reader.take(), workers.poller.take(), workers.writer)
        };

        let current = thread::current().id();
        for handle in [reader, poller].into_iter().flatten() {
            if handle.thread().id() == current {
                lock(&self.workers).exited.push(handle);
                continue;
            }
            let name = handle.thread().name().unwrap_or("activity").to_string();
            if handle.join().is_err() {
                tracing::error!("[redirector] {} thread panicked", name);
            }
        }

        if writer != Some(current) {
            self.lifecycle.wait_writer_finished();
        }

        self.lifecycle.set(Lifecycle::Stopped);
        tracing::debug!("[redirector] stopped");
    }

    fn on_activity_thread(&self) -> bool {
        let current = thread::current().id();
        lock(&self.workers).activities.contains(&current)
    }

    // ========================================================================
    // Activities
    // ========================================================================

    fn reader_loop(self: Arc<Self>, mut serial: Box<dyn SerialLine>) {
        tracing::debug!("[redirector] reader thread started");
        while self.lifecycle.is_running() {
            if let Err(e) = self.forward_serial(serial.as_mut()) {
                if self.lifecycle.is_running() {
                    tracing::error!("[redirector] {}: {}", self.device, e);
                }
                break;
            }
        }
        self.stop();
        tracing::debug!("[redirector] reader thread terminated");
    }

    /// One reader iteration: wait for a byte, take whatever else is buffered
    /// and send it all in one write.
    fn forward_serial(&self, serial: &mut dyn SerialLine) -> io::Result<()> {
        let mut first = [0u8; 1];
        let mut data = match serial.read(&mut first) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                ))
            }
            Ok(n) => first[..n].to_vec(),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(()),
            Err(e) => return Err(e),
        };

        let waiting = serial.bytes_to_read()? as usize;
        if waiting > 0 {
            let start = data.len();
            data.resize(start + waiting, 0);
            match serial.read(&mut data[start..]) {
                Ok(n) => data.truncate(start + n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => data.truncate(start),
                Err(e) => return Err(e),
            }
        }

        tracing::trace!("[redirector] serial -> {}: {}", self.peer, hex::encode(&data));
        let escaped = lock(&self.codec).escape(&data);
        self.network.send(&escaped)
    }

    fn writer_loop(&self, mut serial: Box<dyn SerialLine>) {
        let mut buf = [0u8; CHUNK_SIZE];
        while self.lifecycle.is_running() {
            let n = match (&self.stream).read(&mut buf) {
                Ok(0) => {
                    if self.lifecycle.is_running() {
                        tracing::info!("[redirector] recv EOF from {}", self.peer);
                    }
                    break;
                }
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    if self.lifecycle.is_running() {
                        tracing::error!("[redirector] {}: {}", self.peer, e);
                    }
                    break;
                }
            };

            tracing::trace!("[redirector] {} -> serial: {}", self.peer, hex::encode(&buf[..n]));
            let filtered = lock(&self.codec).filter(&buf[..n]);
            let payload = match filtered {
                Ok(payload) => payload,
                Err(e) => {
                    if self.lifecycle.is_running() {
                        tracing::error!("[redirector] control reply to {} failed: {}", self.peer, e);
                    }
                    break;
                }
            };
            if payload.is_empty() {
                continue;
            }
            if let Err(e) = serial.write_all(&payload) {
                tracing::error!("[redirector] {}: {}", self.device, e);
                break;
            }
        }
    }

    fn poller_loop(self: Arc<Self>, cancel: Receiver<()>) {
        tracing::debug!("[redirector] status line poll thread started");
        loop {
            match cancel.recv_timeout(POLL_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.lifecycle.is_running() {
                break;
            }
            tracing::trace!("[redirector] checking modem lines");
            let polled = lock(&self.codec).poll_modem_status();
            if let Err(e) = polled {
                if self.lifecycle.is_running() {
                    tracing::error!("[redirector] modem status poll failed: {}", e);
                }
                self.stop();
                break;
            }
        }
        tracing::debug!("[redirector] status line poll thread terminated");
    }
}
