// src/io/error.rs
//
// Typed errors for serial and network endpoints.
//
// Every variant carries the device label ("/dev/ttyUSB0", "tcp(10.0.0.2:51234)")
// so log lines can be traced back to the endpoint without extra context.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    #[error("{device}: write failed: {message}")]
    Write { device: String, message: String },

    #[error("{device}: serial port error: {message}")]
    Serial { device: String, message: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        Self::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn write(device: &str, message: impl Into<String>) -> Self {
        Self::Write {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn serial(device: &str, message: impl Into<String>) -> Self {
        Self::Serial {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            IoError::Connection { .. } => io::ErrorKind::ConnectionAborted,
            IoError::Configuration(_) => io::ErrorKind::InvalidInput,
            IoError::Write { .. } | IoError::Serial { .. } => io::ErrorKind::Other,
        }
    }
}

impl From<IoError> for io::Error {
    fn from(err: IoError) -> Self {
        io::Error::new(err.kind(), err)
    }
}
