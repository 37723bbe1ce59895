// src/io/rfc2217/manager.rs
//
// RFC 2217 access server ("port manager").
//
// Escapes serial data for the Telnet stream, filters Telnet commands out of
// network data, applies COM-PORT-OPTION subnegotiations to the serial line and
// reports modem line changes back to the client.

use std::io;
use std::sync::Arc;

use super::options::{OptionState, TelnetOption};
use super::protocol::*;
use crate::io::codec::{ControlChannel, ReplySink};
use crate::io::serial::{FlowControl, LineSettings, Purge, SerialLine};

/// Escape IAC bytes so the peer does not read them as Telnet commands.
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterState {
    Normal,
    IacSeen,
    Negotiate(u8),
}

pub struct PortManager {
    serial: Box<dyn SerialLine>,
    sink: Arc<dyn ReplySink>,
    options: Vec<TelnetOption>,
    state: FilterState,
    /// Collected bytes of the subnegotiation in progress
    suboption: Option<Vec<u8>>,
    signature: String,
    client_is_rfc2217: bool,
    linestate_mask: u8,
    modemstate_mask: u8,
    last_modemstate: Option<u8>,
    remote_suspend_flow: bool,
    // Output line levels as last set through this manager. The server raises
    // DTR and RTS before a session starts.
    dtr: bool,
    rts: bool,
    break_on: bool,
}

impl PortManager {
    /// Create the manager and send the initial option requests.
    pub fn new(serial: Box<dyn SerialLine>, sink: Arc<dyn ReplySink>) -> io::Result<Self> {
        let options = vec![
            TelnetOption::ours("ECHO", ECHO, OptionState::Requested),
            TelnetOption::ours("we-SGA", SGA, OptionState::Requested),
            TelnetOption::theirs("they-SGA", SGA, OptionState::Inactive),
            TelnetOption::ours("we-BINARY", BINARY, OptionState::Inactive),
            TelnetOption::theirs("they-BINARY", BINARY, OptionState::Requested),
            TelnetOption::ours("we-RFC2217", COM_PORT_OPTION, OptionState::Requested),
            TelnetOption::theirs("they-RFC2217", COM_PORT_OPTION, OptionState::Inactive),
        ];

        let manager = Self {
            serial,
            sink,
            options,
            state: FilterState::Normal,
            suboption: None,
            signature: format!("serbridge {}", env!("CARGO_PKG_VERSION")),
            client_is_rfc2217: false,
            linestate_mask: 0,
            modemstate_mask: 255,
            last_modemstate: None,
            remote_suspend_flow: false,
            dtr: true,
            rts: true,
            break_on: false,
        };

        for option in manager.options.iter() {
            if option.state == OptionState::Requested {
                manager.send_option(option.send_yes, option.option)?;
            }
        }
        Ok(manager)
    }

    pub fn client_is_rfc2217(&self) -> bool {
        self.client_is_rfc2217
    }

    pub fn modemstate_mask(&self) -> u8 {
        self.modemstate_mask
    }

    pub fn linestate_mask(&self) -> u8 {
        self.linestate_mask
    }

    /// Whether the client asked us to stop sending data
    pub fn remote_suspend_flow(&self) -> bool {
        self.remote_suspend_flow
    }

    // ========================================================================
    // Outgoing
    // ========================================================================

    fn send_option(&self, action: u8, option: u8) -> io::Result<()> {
        tracing::debug!("[rfc2217] send {} {}", command_name(action), option);
        self.sink.send(&[IAC, action, option])
    }

    fn send_subnegotiation(&self, command: u8, value: &[u8]) -> io::Result<()> {
        let mut frame = vec![IAC, SB, COM_PORT_OPTION, command];
        frame.extend(escape_iac(value));
        frame.extend([IAC, SE]);
        tracing::trace!("[rfc2217] send subnegotiation {}", hex::encode(&frame));
        self.sink.send(&frame)
    }

    /// Read the modem lines and notify the client when they changed.
    pub fn check_modem_lines(&mut self, force: bool) -> io::Result<()> {
        let lines = self.serial.modem_lines()?;
        let mut modemstate = 0u8;
        if lines.cts {
            modemstate |= MODEMSTATE_MASK_CTS;
        }
        if lines.dsr {
            modemstate |= MODEMSTATE_MASK_DSR;
        }
        if lines.ri {
            modemstate |= MODEMSTATE_MASK_RI;
        }
        if lines.cd {
            modemstate |= MODEMSTATE_MASK_CD;
        }

        let deltas = modemstate ^ self.last_modemstate.unwrap_or(0);
        if deltas & MODEMSTATE_MASK_CTS != 0 {
            modemstate |= MODEMSTATE_MASK_CTS_CHANGE;
        }
        if deltas & MODEMSTATE_MASK_DSR != 0 {
            modemstate |= MODEMSTATE_MASK_DSR_CHANGE;
        }
        if deltas & MODEMSTATE_MASK_RI != 0 {
            modemstate |= MODEMSTATE_MASK_RI_CHANGE;
        }
        if deltas & MODEMSTATE_MASK_CD != 0 {
            modemstate |= MODEMSTATE_MASK_CD_CHANGE;
        }

        if Some(modemstate) != self.last_modemstate || force {
            if (self.client_is_rfc2217 && modemstate & self.modemstate_mask != 0) || force {
                self.send_subnegotiation(
                    server(NOTIFY_MODEMSTATE),
                    &[modemstate & self.modemstate_mask],
                )?;
                tracing::info!("[rfc2217] NOTIFY_MODEMSTATE: {}", modemstate);
            }
            self.last_modemstate = Some(modemstate & MODEMSTATE_LINES);
        }
        Ok(())
    }

    // ========================================================================
    // Incoming
    // ========================================================================

    fn negotiate(&mut self, command: u8, option: u8) -> io::Result<()> {
        tracing::debug!("[rfc2217] received {} {}", command_name(command), option);
        let mut known = false;
        let mut replies = Vec::new();
        let mut activated = false;
        for item in self.options.iter_mut().filter(|o| o.option == option) {
            known = true;
            if !item.handles(command) {
                continue;
            }
            let outcome = item.process_incoming(command);
            if let Some(reply) = outcome.reply {
                replies.push(reply);
            }
            if outcome.activated {
                tracing::debug!("[rfc2217] {} is now active", item.name);
                activated |= option == COM_PORT_OPTION;
            }
        }

        for reply in replies {
            self.send_option(reply, option)?;
        }

        if !known && (command == WILL || command == DO) {
            let refusal = if command == WILL { DONT } else { WONT };
            self.send_option(refusal, option)?;
            tracing::warn!("[rfc2217] rejected Telnet option: {}", option);
        }

        if activated && !self.client_is_rfc2217 {
            self.client_is_rfc2217 = true;
            tracing::info!("[rfc2217] client accepts RFC 2217");
            self.check_modem_lines(true)?;
        }
        Ok(())
    }

    fn current_settings(&self) -> Option<LineSettings> {
        match self.serial.settings() {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::error!("[rfc2217] failed to read port settings: {}", e);
                None
            }
        }
    }

    fn subnegotiate(&mut self, suboption: &[u8]) -> io::Result<()> {
        tracing::trace!("[rfc2217] received subnegotiation {}", hex::encode(suboption));
        let (command, value) = match suboption {
            [COM_PORT_OPTION, command, value @ ..] => (*command, value),
            _ => {
                tracing::warn!("[rfc2217] unknown subnegotiation: {:?}", suboption);
                return Ok(());
            }
        };

        match command {
            SIGNATURE => {
                if value.is_empty() {
                    let signature = self.signature.clone();
                    self.send_subnegotiation(server(SIGNATURE), signature.as_bytes())?;
                } else {
                    tracing::info!(
                        "[rfc2217] client signature: {}",
                        String::from_utf8_lossy(value)
                    );
                }
            }
            SET_BAUDRATE => self.set_baudrate(value)?,
            SET_DATASIZE => self.set_datasize(value)?,
            SET_PARITY => self.set_parity(value)?,
            SET_STOPSIZE => self.set_stopsize(value)?,
            SET_CONTROL => match value.first() {
                Some(&control) => self.set_control(control)?,
                None => tracing::error!("[rfc2217] malformed SET_CONTROL"),
            },
            NOTIFY_LINESTATE => {
                // Line state is not monitored, report a clean line
                self.send_subnegotiation(server(NOTIFY_LINESTATE), &[0])?;
            }
            NOTIFY_MODEMSTATE => {
                tracing::info!("[rfc2217] request for modem state");
                self.check_modem_lines(true)?;
            }
            FLOWCONTROL_SUSPEND => {
                tracing::info!("[rfc2217] suspend");
                self.remote_suspend_flow = true;
            }
            FLOWCONTROL_RESUME => {
                tracing::info!("[rfc2217] resume");
                self.remote_suspend_flow = false;
            }
            SET_LINESTATE_MASK => match value.first() {
                Some(&mask) => {
                    self.linestate_mask = mask;
                    tracing::info!("[rfc2217] line state mask: 0x{:02x}", mask);
                    self.send_subnegotiation(server(SET_LINESTATE_MASK), &[mask])?;
                }
                None => tracing::error!("[rfc2217] malformed SET_LINESTATE_MASK"),
            },
            SET_MODEMSTATE_MASK => match value.first() {
                Some(&mask) => {
                    self.modemstate_mask = mask;
                    tracing::info!("[rfc2217] modem state mask: 0x{:02x}", mask);
                    self.send_subnegotiation(server(SET_MODEMSTATE_MASK), &[mask])?;
                }
                None => tracing::error!("[rfc2217] malformed SET_MODEMSTATE_MASK"),
            },
            PURGE_DATA => self.purge(value)?,
            _ => tracing::error!("[rfc2217] undefined COM_PORT_OPTION: {:?}", suboption),
        }
        Ok(())
    }

    fn set_baudrate(&mut self, value: &[u8]) -> io::Result<()> {
        let backup = self.current_settings();
        let requested = value
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(u32::from_be_bytes);
        match requested {
            None => tracing::error!("[rfc2217] malformed SET_BAUDRATE: {:?}", value),
            Some(0) => {}
            Some(baud_rate) => match self.serial.set_baud_rate(baud_rate) {
                Ok(()) => tracing::info!("[rfc2217] set baud rate: {}", baud_rate),
                Err(e) => {
                    tracing::error!("[rfc2217] failed to set baud rate {}: {}", baud_rate, e);
                    self.restore(backup.as_ref());
                }
            },
        }
        let current = self
            .current_settings()
            .or(backup)
            .map(|s| s.baud_rate)
            .unwrap_or_default();
        self.send_subnegotiation(server(SET_BAUDRATE), &current.to_be_bytes())
    }

    fn set_datasize(&mut self, value: &[u8]) -> io::Result<()> {
        let backup = self.current_settings();
        match value.first().copied() {
            None => tracing::error!("[rfc2217] malformed SET_DATASIZE"),
            Some(0) => {}
            Some(bits) => match self.serial.set_data_bits(bits) {
                Ok(()) => tracing::info!("[rfc2217] set data size: {}", bits),
                Err(e) => {
                    tracing::error!("[rfc2217] failed to set data size {}: {}", bits, e);
                    self.restore(backup.as_ref());
                }
            },
        }
        let current = self
            .current_settings()
            .or(backup)
            .map(|s| s.data_bits)
            .unwrap_or_default();
        self.send_subnegotiation(server(SET_DATASIZE), &[current])
    }

    fn set_parity(&mut self, value: &[u8]) -> io::Result<()> {
        let backup = self.current_settings();
        match value.first().copied() {
            None => tracing::error!("[rfc2217] malformed SET_PARITY"),
            Some(0) => {}
            Some(wire) => match parity_from_wire(wire) {
                None => tracing::error!("[rfc2217] invalid parity value: {}", wire),
                Some(parity) => match self.serial.set_parity(parity) {
                    Ok(()) => tracing::info!("[rfc2217] set parity: {:?}", parity),
                    Err(e) => {
                        tracing::error!("[rfc2217] failed to set parity {:?}: {}", parity, e);
                        self.restore(backup.as_ref());
                    }
                },
            },
        }
        let current = self.current_settings().or(backup).unwrap_or_default();
        self.send_subnegotiation(server(SET_PARITY), &[parity_to_wire(current.parity)])
    }

    fn set_stopsize(&mut self, value: &[u8]) -> io::Result<()> {
        let backup = self.current_settings();
        match value.first().copied() {
            None => tracing::error!("[rfc2217] malformed SET_STOPSIZE"),
            Some(0) => {}
            Some(wire) => match stop_bits_from_wire(wire) {
                None => tracing::error!("[rfc2217] invalid stop size value: {}", wire),
                Some(bits) => match self.serial.set_stop_bits(bits) {
                    Ok(()) => tracing::info!("[rfc2217] set stop bits: {:?}", bits),
                    Err(e) => {
                        tracing::error!("[rfc2217] failed to set stop bits {:?}: {}", bits, e);
                        self.restore(backup.as_ref());
                    }
                },
            },
        }
        let current = self.current_settings().or(backup).unwrap_or_default();
        self.send_subnegotiation(server(SET_STOPSIZE), &[stop_bits_to_wire(current.stop_bits)])
    }

    fn restore(&mut self, backup: Option<&LineSettings>) {
        if let Some(settings) = backup {
            if let Err(e) = self.serial.apply_settings(settings) {
                tracing::error!("[rfc2217] failed to restore port settings: {}", e);
            }
        }
    }

    fn set_control(&mut self, control: u8) -> io::Result<()> {
        let reply = match control {
            SET_CONTROL_REQ_FLOW_SETTING => {
                let flow = self
                    .current_settings()
                    .map(|s| s.flow_control)
                    .unwrap_or_default();
                flow_to_wire(flow)
            }
            SET_CONTROL_USE_NO_FLOW_CONTROL
            | SET_CONTROL_USE_SW_FLOW_CONTROL
            | SET_CONTROL_USE_HW_FLOW_CONTROL => {
                let flow = match control {
                    SET_CONTROL_USE_SW_FLOW_CONTROL => FlowControl::Software,
                    SET_CONTROL_USE_HW_FLOW_CONTROL => FlowControl::Hardware,
                    _ => FlowControl::None,
                };
                match self.serial.set_flow_control(flow) {
                    Ok(()) => tracing::info!("[rfc2217] changed flow control to {:?}", flow),
                    Err(e) => tracing::error!("[rfc2217] failed to set flow control: {}", e),
                }
                let current = self
                    .current_settings()
                    .map(|s| s.flow_control)
                    .unwrap_or_default();
                flow_to_wire(current)
            }
            SET_CONTROL_REQ_BREAK_STATE => self.break_reply(),
            SET_CONTROL_BREAK_ON | SET_CONTROL_BREAK_OFF => {
                let on = control == SET_CONTROL_BREAK_ON;
                match self.serial.set_break(on) {
                    Ok(()) => {
                        self.break_on = on;
                        tracing::info!("[rfc2217] changed BREAK to {}", on_off(on));
                    }
                    Err(e) => tracing::error!("[rfc2217] failed to set BREAK: {}", e),
                }
                self.break_reply()
            }
            SET_CONTROL_REQ_DTR => self.dtr_reply(),
            SET_CONTROL_DTR_ON | SET_CONTROL_DTR_OFF => {
                let on = control == SET_CONTROL_DTR_ON;
                match self.serial.set_dtr(on) {
                    Ok(()) => {
                        self.dtr = on;
                        tracing::info!("[rfc2217] changed DTR to {}", on_off(on));
                    }
                    Err(e) => tracing::error!("[rfc2217] failed to set DTR: {}", e),
                }
                self.dtr_reply()
            }
            SET_CONTROL_REQ_RTS => self.rts_reply(),
            SET_CONTROL_RTS_ON | SET_CONTROL_RTS_OFF => {
                let on = control == SET_CONTROL_RTS_ON;
                match self.serial.set_rts(on) {
                    Ok(()) => {
                        self.rts = on;
                        tracing::info!("[rfc2217] changed RTS to {}", on_off(on));
                    }
                    Err(e) => tracing::error!("[rfc2217] failed to set RTS: {}", e),
                }
                self.rts_reply()
            }
            SET_CONTROL_REQ_FLOW_SETTING_IN..=SET_CONTROL_USE_DSR_FLOW_CONTROL => {
                tracing::warn!("[rfc2217] inbound flow control {} not implemented", control);
                return Ok(());
            }
            _ => {
                tracing::error!("[rfc2217] undefined SET_CONTROL value: {}", control);
                return Ok(());
            }
        };
        self.send_subnegotiation(server(SET_CONTROL), &[reply])
    }

    fn break_reply(&self) -> u8 {
        if self.break_on {
            SET_CONTROL_BREAK_ON
        } else {
            SET_CONTROL_BREAK_OFF
        }
    }

    fn dtr_reply(&self) -> u8 {
        if self.dtr {
            SET_CONTROL_DTR_ON
        } else {
            SET_CONTROL_DTR_OFF
        }
    }

    fn rts_reply(&self) -> u8 {
        if self.rts {
            SET_CONTROL_RTS_ON
        } else {
            SET_CONTROL_RTS_OFF
        }
    }

    fn purge(&mut self, value: &[u8]) -> io::Result<()> {
        let (which, code) = match value.first().copied() {
            Some(PURGE_RECEIVE_BUFFER) => (Purge::Receive, PURGE_RECEIVE_BUFFER),
            Some(PURGE_TRANSMIT_BUFFER) => (Purge::Transmit, PURGE_TRANSMIT_BUFFER),
            Some(PURGE_BOTH_BUFFERS) => (Purge::Both, PURGE_BOTH_BUFFERS),
            other => {
                tracing::error!("[rfc2217] undefined PURGE_DATA: {:?}", other);
                return Ok(());
            }
        };
        match self.serial.purge(which) {
            Ok(()) => tracing::info!("[rfc2217] purge {:?}", which),
            Err(e) => tracing::error!("[rfc2217] failed to purge {:?}: {}", which, e),
        }
        self.send_subnegotiation(server(PURGE_DATA), &[code])
    }
}

fn flow_to_wire(flow: FlowControl) -> u8 {
    match flow {
        FlowControl::None => SET_CONTROL_USE_NO_FLOW_CONTROL,
        FlowControl::Software => SET_CONTROL_USE_SW_FLOW_CONTROL,
        FlowControl::Hardware => SET_CONTROL_USE_HW_FLOW_CONTROL,
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "active"
    } else {
        "inactive"
    }
}

impl ControlChannel for PortManager {
    fn protocol(&self) -> &'static str {
        "rfc2217"
    }

    fn escape(&mut self, data: &[u8]) -> Vec<u8> {
        escape_iac(data)
    }

    fn filter(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(data.len());
        for &byte in data {
            match self.state {
                FilterState::Normal => {
                    if byte == IAC {
                        self.state = FilterState::IacSeen;
                    } else if let Some(suboption) = self.suboption.as_mut() {
                        suboption.push(byte);
                    } else {
                        payload.push(byte);
                    }
                }
                FilterState::IacSeen => {
                    self.state = FilterState::Normal;
                    match byte {
                        IAC => match self.suboption.as_mut() {
                            Some(suboption) => suboption.push(IAC),
                            None => payload.push(IAC),
                        },
                        SB => self.suboption = Some(Vec::new()),
                        SE => match self.suboption.take() {
                            Some(suboption) => self.subnegotiate(&suboption)?,
                            None => tracing::warn!("[rfc2217] SE outside of subnegotiation"),
                        },
                        WILL | WONT | DO | DONT => self.state = FilterState::Negotiate(byte),
                        _ => tracing::warn!(
                            "[rfc2217] ignoring Telnet command: {}",
                            command_name(byte)
                        ),
                    }
                }
                FilterState::Negotiate(command) => {
                    self.state = FilterState::Normal;
                    self.negotiate(command, byte)?;
                }
            }
        }
        Ok(payload)
    }

    fn poll_modem_status(&mut self) -> io::Result<()> {
        self.check_modem_lines(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::{MemorySerialLine, ModemLines, Parity, StopBits};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<u8>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<u8> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl ReplySink for Recorder {
        fn send(&self, data: &[u8]) -> io::Result<()> {
            self.sent.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
    }

    fn setup() -> (PortManager, MemorySerialLine, Arc<Recorder>) {
        let line = MemorySerialLine::new("mem", Duration::from_millis(10));
        let recorder = Arc::new(Recorder::default());
        let mut manager =
            PortManager::new(Box::new(line.clone()), recorder.clone()).expect("manager");
        manager.signature = "test-server".to_string();
        recorder.take();
        (manager, line, recorder)
    }

    fn sub(command: u8, value: &[u8]) -> Vec<u8> {
        let mut frame = vec![IAC, SB, COM_PORT_OPTION, command];
        frame.extend(escape_iac(value));
        frame.extend([IAC, SE]);
        frame
    }

    #[test]
    fn test_initial_negotiation() {
        let line = MemorySerialLine::new("mem", Duration::from_millis(10));
        let recorder = Arc::new(Recorder::default());
        PortManager::new(Box::new(line), recorder.clone()).expect("manager");
        assert_eq!(
            recorder.take(),
            vec![
                IAC, WILL, ECHO, IAC, WILL, SGA, IAC, DO, BINARY, IAC, WILL, COM_PORT_OPTION
            ]
        );
    }

    #[test]
    fn test_escape_doubles_iac() {
        let (mut manager, _, _) = setup();
        assert_eq!(manager.escape(&[1, IAC, 2]), vec![1, IAC, IAC, 2]);
        assert_eq!(manager.escape(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn test_filter_passes_payload_and_unescapes() {
        let (mut manager, _, recorder) = setup();
        let out = manager.filter(&[b'A', IAC, IAC, b'T']).expect("filter");
        assert_eq!(out, vec![b'A', IAC, b'T']);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_filter_handles_sequences_split_across_reads() {
        let (mut manager, line, recorder) = setup();
        let frame = sub(SET_BAUDRATE, &115200u32.to_be_bytes());
        let (first, second) = frame.split_at(5);

        let mut out = manager.filter(first).expect("filter");
        out.extend(manager.filter(second).expect("filter"));
        out.extend(manager.filter(b"x").expect("filter"));

        assert_eq!(out, b"x".to_vec());
        assert_eq!(line.settings().expect("settings").baud_rate, 115200);
        assert_eq!(recorder.take(), sub(server(SET_BAUDRATE), &115200u32.to_be_bytes()));
    }

    #[test]
    fn test_client_activation_forces_modem_notification() {
        let (mut manager, line, recorder) = setup();
        line.set_modem_lines(ModemLines {
            cts: true,
            dsr: true,
            ..ModemLines::default()
        });

        manager.filter(&[IAC, DO, COM_PORT_OPTION]).expect("filter");
        assert!(manager.client_is_rfc2217());
        let expected = MODEMSTATE_MASK_CTS
            | MODEMSTATE_MASK_DSR
            | MODEMSTATE_MASK_CTS_CHANGE
            | MODEMSTATE_MASK_DSR_CHANGE;
        assert_eq!(recorder.take(), sub(server(NOTIFY_MODEMSTATE), &[expected]));
    }

    #[test]
    fn test_accepts_client_will_binary_and_refuses_unknown() {
        let (mut manager, _, recorder) = setup();
        // they-BINARY was requested, so WILL only confirms it
        manager.filter(&[IAC, WILL, BINARY]).expect("filter");
        assert!(recorder.take().is_empty());

        // we-BINARY was inactive, DO is accepted with WILL
        manager.filter(&[IAC, DO, BINARY]).expect("filter");
        assert_eq!(recorder.take(), vec![IAC, WILL, BINARY]);

        manager.filter(&[IAC, DO, 24]).expect("filter");
        assert_eq!(recorder.take(), vec![IAC, WONT, 24]);
        manager.filter(&[IAC, WILL, 31]).expect("filter");
        assert_eq!(recorder.take(), vec![IAC, DONT, 31]);
    }

    #[test]
    fn test_verb_for_other_direction_is_ignored() {
        let (mut manager, _, recorder) = setup();
        // ECHO is only offered by us; WILL/WONT ECHO from the client is not
        // an answer to anything and must not be refused as unknown
        manager.filter(&[IAC, WILL, ECHO]).expect("filter");
        manager.filter(&[IAC, WONT, ECHO]).expect("filter");
        assert!(recorder.take().is_empty());
        let echo = manager
            .options
            .iter()
            .find(|o| o.option == ECHO)
            .expect("echo option");
        assert_eq!(echo.state, OptionState::Requested);
    }

    #[test]
    fn test_signature_request() {
        let (mut manager, _, recorder) = setup();
        manager.filter(&sub(SIGNATURE, &[])).expect("filter");
        assert_eq!(recorder.take(), sub(server(SIGNATURE), b"test-server"));

        manager.filter(&sub(SIGNATURE, b"client 1.0")).expect("filter");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_baudrate_query_does_not_change_port() {
        let (mut manager, line, recorder) = setup();
        manager.filter(&sub(SET_BAUDRATE, &[0, 0, 0, 0])).expect("filter");
        assert_eq!(line.settings().expect("settings").baud_rate, 9600);
        assert_eq!(recorder.take(), sub(server(SET_BAUDRATE), &9600u32.to_be_bytes()));
    }

    #[test]
    fn test_baudrate_with_iac_byte_is_escaped_in_reply() {
        let (mut manager, _, recorder) = setup();
        let baud = 0x0001_C2FFu32;
        manager.filter(&sub(SET_BAUDRATE, &baud.to_be_bytes())).expect("filter");
        let reply = recorder.take();
        assert_eq!(
            reply,
            vec![IAC, SB, COM_PORT_OPTION, 101, 0x00, 0x01, 0xC2, IAC, IAC, IAC, SE]
        );
    }

    #[test]
    fn test_datasize_failure_keeps_previous_value() {
        let (mut manager, line, recorder) = setup();
        manager.filter(&sub(SET_DATASIZE, &[7])).expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_DATASIZE), &[7]));

        manager.filter(&sub(SET_DATASIZE, &[9])).expect("filter");
        assert_eq!(line.settings().expect("settings").data_bits, 7);
        assert_eq!(recorder.take(), sub(server(SET_DATASIZE), &[7]));
    }

    #[test]
    fn test_parity_and_stopsize() {
        let (mut manager, line, recorder) = setup();
        manager.filter(&sub(SET_PARITY, &[3])).expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_PARITY), &[3]));
        assert_eq!(line.settings().expect("settings").parity, Parity::Even);

        // mark parity is refused by the driver, previous value is reported
        manager.filter(&sub(SET_PARITY, &[4])).expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_PARITY), &[3]));

        manager.filter(&sub(SET_STOPSIZE, &[2])).expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_STOPSIZE), &[2]));
        assert_eq!(line.settings().expect("settings").stop_bits, StopBits::Two);
    }

    #[test]
    fn test_set_control_lines_and_queries() {
        let (mut manager, line, recorder) = setup();

        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_DTR_OFF]))
            .expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_CONTROL), &[SET_CONTROL_DTR_OFF]));
        assert!(!line.control_lines().1);

        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_REQ_DTR]))
            .expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_CONTROL), &[SET_CONTROL_DTR_OFF]));

        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_REQ_RTS]))
            .expect("filter");
        assert_eq!(recorder.take(), sub(server(SET_CONTROL), &[SET_CONTROL_RTS_ON]));

        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_BREAK_ON]))
            .expect("filter");
        assert!(line.break_state());
        assert_eq!(recorder.take(), sub(server(SET_CONTROL), &[SET_CONTROL_BREAK_ON]));

        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_USE_HW_FLOW_CONTROL]))
            .expect("filter");
        assert_eq!(
            line.settings().expect("settings").flow_control,
            FlowControl::Hardware
        );
        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_REQ_FLOW_SETTING]))
            .expect("filter");
        assert_eq!(
            recorder.take(),
            [
                sub(server(SET_CONTROL), &[SET_CONTROL_USE_HW_FLOW_CONTROL]),
                sub(server(SET_CONTROL), &[SET_CONTROL_USE_HW_FLOW_CONTROL]),
            ]
            .concat()
        );

        // inbound flow control has no reply
        manager
            .filter(&sub(SET_CONTROL, &[SET_CONTROL_USE_DTR_FLOW_CONTROL]))
            .expect("filter");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_masks_flow_suspend_and_linestate() {
        let (mut manager, _, recorder) = setup();
        manager.filter(&sub(SET_MODEMSTATE_MASK, &[0x30])).expect("filter");
        manager.filter(&sub(SET_LINESTATE_MASK, &[0x10])).expect("filter");
        assert_eq!(manager.modemstate_mask(), 0x30);
        assert_eq!(manager.linestate_mask(), 0x10);
        assert_eq!(
            recorder.take(),
            [
                sub(server(SET_MODEMSTATE_MASK), &[0x30]),
                sub(server(SET_LINESTATE_MASK), &[0x10]),
            ]
            .concat()
        );

        manager.filter(&sub(FLOWCONTROL_SUSPEND, &[])).expect("filter");
        assert!(manager.remote_suspend_flow());
        manager.filter(&sub(FLOWCONTROL_RESUME, &[])).expect("filter");
        assert!(!manager.remote_suspend_flow());

        manager.filter(&sub(NOTIFY_LINESTATE, &[])).expect("filter");
        assert_eq!(recorder.take(), sub(server(NOTIFY_LINESTATE), &[0]));
    }

    #[test]
    fn test_purge() {
        let (mut manager, line, recorder) = setup();
        line.inject(b"stale");
        manager.filter(&sub(PURGE_DATA, &[PURGE_BOTH_BUFFERS])).expect("filter");
        assert_eq!(line.purges(), vec![Purge::Both]);
        assert_eq!(line.bytes_to_read().expect("count"), 0);
        assert_eq!(recorder.take(), sub(server(PURGE_DATA), &[PURGE_BOTH_BUFFERS]));

        manager.filter(&sub(PURGE_DATA, &[7])).expect("filter");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_modem_poll_notifies_only_on_change() {
        let (mut manager, line, recorder) = setup();
        manager.filter(&[IAC, DO, COM_PORT_OPTION]).expect("filter");
        recorder.take();

        manager.poll_modem_status().expect("poll");
        assert!(recorder.take().is_empty());

        line.set_modem_lines(ModemLines {
            cd: true,
            ..ModemLines::default()
        });
        manager.poll_modem_status().expect("poll");
        assert_eq!(
            recorder.take(),
            sub(
                server(NOTIFY_MODEMSTATE),
                &[MODEMSTATE_MASK_CD | MODEMSTATE_MASK_CD_CHANGE]
            )
        );

        manager.poll_modem_status().expect("poll");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_modem_poll_silent_before_client_accepts() {
        let (mut manager, line, recorder) = setup();
        line.set_modem_lines(ModemLines {
            cts: true,
            ..ModemLines::default()
        });
        manager.poll_modem_status().expect("poll");
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_subnegotiation_payload_never_reaches_serial() {
        let (mut manager, _, _) = setup();
        let mut data = b"a".to_vec();
        data.extend(sub(SIGNATURE, b"hello"));
        data.extend(b"b");
        assert_eq!(manager.filter(&data).expect("filter"), b"ab".to_vec());
    }
}
