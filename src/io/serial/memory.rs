// src/io/serial/memory.rs
//
// In-memory serial line.
//
// Backs the `loop://` port (everything written is read back, like a loopback
// plug on the connector) and doubles as a scriptable device in tests: the
// "far end" of the line can inject data, inspect what was written, toggle the
// modem status inputs and unplug the device.
//
// All clones share one state, so try_clone() behaves like a second file
// descriptor on the same tty.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::line::SerialLine;
use super::utils::{self, FlowControl, LineSettings, ModemLines, Parity, Purge, StopBits};
use crate::io::error::IoError;

/// Port name that opens a loopback line instead of a device
pub const LOOPBACK_URL: &str = "loop://";

#[derive(Debug, Default)]
struct MemoryState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    settings: LineSettings,
    lines: ModemLines,
    rts: bool,
    dtr: bool,
    break_on: bool,
    purges: Vec<Purge>,
    unplugged: bool,
    write_fault: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    changed: Condvar,
}

#[derive(Clone, Debug)]
pub struct MemorySerialLine {
    name: String,
    timeout: Duration,
    loopback: bool,
    shared: Arc<Shared>,
}

impl MemorySerialLine {
    pub fn new(name: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            timeout,
            loopback: false,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn loopback(timeout: Duration) -> Self {
        Self {
            loopback: true,
            ..Self::new(LOOPBACK_URL, timeout)
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_plugged(&self) -> Result<(), IoError> {
        if self.lock().unplugged {
            return Err(IoError::serial(&self.name, "device unplugged"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Far end of the line
    // ------------------------------------------------------------------------

    /// Data arriving from the attached device
    pub fn inject(&self, data: &[u8]) {
        self.lock().rx.extend(data.iter().copied());
        self.shared.changed.notify_all();
    }

    /// Everything written to the device so far
    pub fn written(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Block until at least `len` bytes were written or the timeout passes.
    pub fn wait_written(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.tx.len() < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.tx.clone()
    }

    pub fn set_modem_lines(&self, lines: ModemLines) {
        self.lock().lines = lines;
    }

    /// (RTS, DTR) output levels
    pub fn control_lines(&self) -> (bool, bool) {
        let state = self.lock();
        (state.rts, state.dtr)
    }

    pub fn break_state(&self) -> bool {
        self.lock().break_on
    }

    pub fn purges(&self) -> Vec<Purge> {
        self.lock().purges.clone()
    }

    /// Make writes fail while reads keep working, like a stalled transmitter.
    pub fn fail_writes(&self) {
        self.lock().write_fault = true;
    }

    /// Simulate the adapter being pulled: pending reads return 0 and every
    /// other operation fails.
    pub fn unplug(&self) {
        self.lock().unplugged = true;
        self.shared.changed.notify_all();
    }
}

impl SerialLine for MemorySerialLine {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        loop {
            if !state.rx.is_empty() {
                let n = buf.len().min(state.rx.len());
                for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if state.unplugged {
                return Ok(0);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn bytes_to_read(&self) -> io::Result<u32> {
        let state = self.lock();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(state.rx.len() as u32)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if state.write_fault {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"));
        }
        state.tx.extend_from_slice(buf);
        if self.loopback {
            state.rx.extend(buf.iter().copied());
        }
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn settings(&self) -> Result<LineSettings, IoError> {
        self.check_plugged()?;
        Ok(self.lock().settings.clone())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), IoError> {
        self.check_plugged()?;
        self.lock().settings.baud_rate = baud_rate;
        Ok(())
    }

    // Validation mirrors what the native driver accepts.
    fn set_data_bits(&mut self, data_bits: u8) -> Result<(), IoError> {
        self.check_plugged()?;
        utils::to_serialport_data_bits(data_bits)?;
        self.lock().settings.data_bits = data_bits;
        Ok(())
    }

    fn set_parity(&mut self, parity: Parity) -> Result<(), IoError> {
        self.check_plugged()?;
        utils::to_serialport_parity(parity)?;
        self.lock().settings.parity = parity;
        Ok(())
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<(), IoError> {
        self.check_plugged()?;
        utils::to_serialport_stop_bits(stop_bits)?;
        self.lock().settings.stop_bits = stop_bits;
        Ok(())
    }

    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<(), IoError> {
        self.check_plugged()?;
        self.lock().settings.flow_control = flow_control;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), IoError> {
        self.check_plugged()?;
        self.lock().rts = level;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), IoError> {
        self.check_plugged()?;
        self.lock().dtr = level;
        Ok(())
    }

    fn set_break(&mut self, on: bool) -> Result<(), IoError> {
        self.check_plugged()?;
        self.lock().break_on = on;
        Ok(())
    }

    fn modem_lines(&mut self) -> Result<ModemLines, IoError> {
        self.check_plugged()?;
        Ok(self.lock().lines)
    }

    fn purge(&mut self, which: Purge) -> Result<(), IoError> {
        self.check_plugged()?;
        let mut state = self.lock();
        if matches!(which, Purge::Receive | Purge::Both) {
            state.rx.clear();
        }
        state.purges.push(which);
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn SerialLine>, IoError> {
        self.check_plugged()?;
        Ok(Box::new(self.clone()))
    }
}
