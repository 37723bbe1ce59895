// src/io/passthrough.rs
//
// Identity control channel for raw TCP bridging (--raw). No control
// protocol: bytes cross in both directions untouched and modem line changes
// are not reported.

use std::io;

use super::codec::ControlChannel;

#[derive(Debug, Default)]
pub struct PassthroughChannel;

impl ControlChannel for PassthroughChannel {
    fn protocol(&self) -> &'static str {
        "raw"
    }

    fn escape(&mut self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn filter(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn poll_modem_status(&mut self) -> io::Result<()> {
        Ok(())
    }
}
