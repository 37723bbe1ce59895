// src/io/serial/line.rs
//
// The serial endpoint as the bridge sees it.
//
// A session works with three independent handles to the same device: the
// reader activity owns the read path, the writer activity owns the write path,
// and the control channel owns settings and control lines. `try_clone` is how
// those handles are obtained, so no lock is ever needed on the device itself.

use std::io;

use super::utils::{FlowControl, LineSettings, ModemLines, Parity, Purge, StopBits};
use crate::io::error::IoError;

pub trait SerialLine: Send {
    /// Device name used in log lines
    fn name(&self) -> String;

    /// Blocking read bounded by the port timeout.
    ///
    /// A timeout with no data is reported as `io::ErrorKind::TimedOut`.
    /// `Ok(0)` means the device is gone.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes already buffered by the driver
    fn bytes_to_read(&self) -> io::Result<u32>;

    /// Write the whole buffer and flush it to the device
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn settings(&self) -> Result<LineSettings, IoError>;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), IoError>;

    fn set_data_bits(&mut self, data_bits: u8) -> Result<(), IoError>;

    fn set_parity(&mut self, parity: Parity) -> Result<(), IoError>;

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<(), IoError>;

    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<(), IoError>;

    fn set_rts(&mut self, level: bool) -> Result<(), IoError>;

    fn set_dtr(&mut self, level: bool) -> Result<(), IoError>;

    fn set_break(&mut self, on: bool) -> Result<(), IoError>;

    fn modem_lines(&mut self) -> Result<ModemLines, IoError>;

    fn purge(&mut self, which: Purge) -> Result<(), IoError>;

    fn try_clone(&self) -> Result<Box<dyn SerialLine>, IoError>;

    /// Apply a full line configuration, e.g. to restore a snapshot taken at connect time.
    fn apply_settings(&mut self, settings: &LineSettings) -> Result<(), IoError> {
        self.set_baud_rate(settings.baud_rate)?;
        self.set_data_bits(settings.data_bits)?;
        self.set_parity(settings.parity)?;
        self.set_stop_bits(settings.stop_bits)?;
        self.set_flow_control(settings.flow_control)
    }
}
