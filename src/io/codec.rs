// src/io/codec.rs
//
// Control channel codec trait.
//
// The redirector carries an in-band control protocol on the same TCP stream
// as the bridged serial data. A codec sits between the two endpoints:
// - escape() prepares serial data for the network so it cannot be mistaken
//   for a control sequence
// - filter() strips and acts on control sequences arriving from the network,
//   returning the plain payload for the serial device
// - poll_modem_status() reports modem line changes to the peer
//
// Implementations:
// - rfc2217/manager.rs - RFC 2217 (Telnet COM-PORT-OPTION) port manager
// - passthrough.rs - identity codec for raw TCP bridging

use std::io;

// ============================================================================
// Reply Sink
// ============================================================================

/// Where a codec writes its protocol replies.
///
/// Replies bypass escaping but must share the network write lock with bridged
/// data, so the sink is the same object the redirector sends through.
pub trait ReplySink: Send + Sync {
    fn send(&self, data: &[u8]) -> io::Result<()>;
}

// ============================================================================
// Control Channel Trait
// ============================================================================

pub trait ControlChannel: Send {
    /// Short protocol name for log lines
    fn protocol(&self) -> &'static str;

    /// Transform serial data for transmission over the shared channel.
    fn escape(&mut self, data: &[u8]) -> Vec<u8>;

    /// Extract and act on control sequences in network data.
    ///
    /// Returns the residual payload for the serial device. Fails only when a
    /// reply could not be written to the network, which ends the session.
    fn filter(&mut self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Check the modem status lines and notify the peer when they changed.
    fn poll_modem_status(&mut self) -> io::Result<()>;
}
