// src/io/mod.rs
//
// Endpoints and control-channel codecs used by a redirector session.
// The serial line and the TCP write path are the two endpoints; codecs sit
// between them and carry the in-band control protocol.

// Core modules
pub mod codec; // ControlChannel + ReplySink traits
mod error;
pub mod network; // locked network write path

// Control channels
pub mod passthrough;
pub mod rfc2217;

// Serial driver
pub mod serial;

pub use codec::{ControlChannel, ReplySink};
pub use error::IoError;
pub use network::NetworkWriter;
pub use passthrough::PassthroughChannel;
pub use rfc2217::PortManager;
pub use serial::SerialLine;
