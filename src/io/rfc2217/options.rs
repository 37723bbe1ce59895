// src/io/rfc2217/options.rs
//
// Telnet option negotiation state machine (RFC 1143 style, without queues).
//
// Each option is tracked from one side's point of view: `send_yes`/`send_no`
// are the verbs we send to enable/disable it and `ack_yes`/`ack_no` the verbs
// that confirm or refuse it from the peer. Server-side options ("we") use
// WILL/WONT out and DO/DONT back; client-side options ("they") the reverse.

use super::protocol::{DO, DONT, WILL, WONT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionState {
    /// We asked for it and are waiting for the answer
    Requested,
    Active,
    Inactive,
    /// Refused for good, every request is answered with `send_no`
    ReallyInactive,
}

/// Outcome of one incoming negotiation verb
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Verb to send back for this option, if any
    pub reply: Option<u8>,
    /// The option just became active
    pub activated: bool,
}

#[derive(Clone, Debug)]
pub struct TelnetOption {
    pub name: &'static str,
    pub option: u8,
    pub send_yes: u8,
    pub send_no: u8,
    pub ack_yes: u8,
    pub ack_no: u8,
    pub state: OptionState,
}

impl TelnetOption {
    /// Option we offer (WILL/WONT out, DO/DONT back)
    pub fn ours(name: &'static str, option: u8, initial: OptionState) -> Self {
        Self {
            name,
            option,
            send_yes: WILL,
            send_no: WONT,
            ack_yes: DO,
            ack_no: DONT,
            state: initial,
        }
    }

    /// Option we ask the peer to enable (DO/DONT out, WILL/WONT back)
    pub fn theirs(name: &'static str, option: u8, initial: OptionState) -> Self {
        Self {
            name,
            option,
            send_yes: DO,
            send_no: DONT,
            ack_yes: WILL,
            ack_no: WONT,
            state: initial,
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.state == OptionState::Active
    }

    /// Whether this entry should see an incoming verb at all
    pub fn handles(&self, command: u8) -> bool {
        command == self.ack_yes || command == self.ack_no
    }

    pub fn process_incoming(&mut self, command: u8) -> Negotiation {
        let mut result = Negotiation::default();
        if command == self.ack_yes {
            match self.state {
                OptionState::Requested => {
                    self.state = OptionState::Active;
                    result.activated = true;
                }
                OptionState::Active => {}
                OptionState::Inactive => {
                    self.state = OptionState::Active;
                    result.reply = Some(self.send_yes);
                    result.activated = true;
                }
                OptionState::ReallyInactive => {
                    result.reply = Some(self.send_no);
                }
            }
        } else if command == self.ack_no {
            match self.state {
                OptionState::Requested => {
                    self.state = OptionState::Inactive;
                }
                OptionState::Active => {
                    self.state = OptionState::Inactive;
                    result.reply = Some(self.send_no);
                }
                OptionState::Inactive | OptionState::ReallyInactive => {}
            }
        }
        result
    }
}
