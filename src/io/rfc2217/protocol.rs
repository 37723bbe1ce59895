// src/io/rfc2217/protocol.rs
//
// Telnet (RFC 854/855) and COM-PORT-OPTION (RFC 2217) wire constants.

use crate::io::serial::{Parity, StopBits};

// ============================================================================
// Telnet
// ============================================================================

pub const SE: u8 = 240;
pub const NOP: u8 = 241;
pub const DM: u8 = 242;
pub const BRK: u8 = 243;
pub const IP: u8 = 244;
pub const AO: u8 = 245;
pub const AYT: u8 = 246;
pub const EC: u8 = 247;
pub const EL: u8 = 248;
pub const GA: u8 = 249;
pub const SB: u8 = 250;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const IAC: u8 = 255;

pub const BINARY: u8 = 0;
pub const ECHO: u8 = 1;
pub const SGA: u8 = 3;
pub const COM_PORT_OPTION: u8 = 44;

// ============================================================================
// COM-PORT-OPTION commands (client to access server)
// ============================================================================

pub const SIGNATURE: u8 = 0;
pub const SET_BAUDRATE: u8 = 1;
pub const SET_DATASIZE: u8 = 2;
pub const SET_PARITY: u8 = 3;
pub const SET_STOPSIZE: u8 = 4;
pub const SET_CONTROL: u8 = 5;
pub const NOTIFY_LINESTATE: u8 = 6;
pub const NOTIFY_MODEMSTATE: u8 = 7;
pub const FLOWCONTROL_SUSPEND: u8 = 8;
pub const FLOWCONTROL_RESUME: u8 = 9;
pub const SET_LINESTATE_MASK: u8 = 10;
pub const SET_MODEMSTATE_MASK: u8 = 11;
pub const PURGE_DATA: u8 = 12;

/// Server replies use the client command code plus this offset
pub const SERVER_OFFSET: u8 = 100;

pub const fn server(command: u8) -> u8 {
    command + SERVER_OFFSET
}

// ============================================================================
// SET_CONTROL values
// ============================================================================

pub const SET_CONTROL_REQ_FLOW_SETTING: u8 = 0;
pub const SET_CONTROL_USE_NO_FLOW_CONTROL: u8 = 1;
pub const SET_CONTROL_USE_SW_FLOW_CONTROL: u8 = 2;
pub const SET_CONTROL_USE_HW_FLOW_CONTROL: u8 = 3;
pub const SET_CONTROL_REQ_BREAK_STATE: u8 = 4;
pub const SET_CONTROL_BREAK_ON: u8 = 5;
pub const SET_CONTROL_BREAK_OFF: u8 = 6;
pub const SET_CONTROL_REQ_DTR: u8 = 7;
pub const SET_CONTROL_DTR_ON: u8 = 8;
pub const SET_CONTROL_DTR_OFF: u8 = 9;
pub const SET_CONTROL_REQ_RTS: u8 = 10;
pub const SET_CONTROL_RTS_ON: u8 = 11;
pub const SET_CONTROL_RTS_OFF: u8 = 12;
pub const SET_CONTROL_REQ_FLOW_SETTING_IN: u8 = 13;
pub const SET_CONTROL_USE_NO_FLOW_CONTROL_IN: u8 = 14;
pub const SET_CONTROL_USE_SW_FLOW_CONTROL_IN: u8 = 15;
pub const SET_CONTROL_USE_HW_FLOW_CONTROL_IN: u8 = 16;
pub const SET_CONTROL_USE_DCD_FLOW_CONTROL: u8 = 17;
pub const SET_CONTROL_USE_DTR_FLOW_CONTROL: u8 = 18;
pub const SET_CONTROL_USE_DSR_FLOW_CONTROL: u8 = 19;

// ============================================================================
// Modem state bits
// ============================================================================

pub const MODEMSTATE_MASK_CD: u8 = 128;
pub const MODEMSTATE_MASK_RI: u8 = 64;
pub const MODEMSTATE_MASK_DSR: u8 = 32;
pub const MODEMSTATE_MASK_CTS: u8 = 16;
pub const MODEMSTATE_MASK_CD_CHANGE: u8 = 8;
pub const MODEMSTATE_MASK_RI_CHANGE: u8 = 4;
pub const MODEMSTATE_MASK_DSR_CHANGE: u8 = 2;
pub const MODEMSTATE_MASK_CTS_CHANGE: u8 = 1;

/// Line bits without the delta bits
pub const MODEMSTATE_LINES: u8 = 0xF0;

// ============================================================================
// PURGE_DATA values
// ============================================================================

pub const PURGE_RECEIVE_BUFFER: u8 = 1;
pub const PURGE_TRANSMIT_BUFFER: u8 = 2;
pub const PURGE_BOTH_BUFFERS: u8 = 3;

// ============================================================================
// Wire encodings of line settings
// ============================================================================

pub fn parity_to_wire(parity: Parity) -> u8 {
    match parity {
        Parity::None => 1,
        Parity::Odd => 2,
        Parity::Even => 3,
        Parity::Mark => 4,
        Parity::Space => 5,
    }
}

pub fn parity_from_wire(value: u8) -> Option<Parity> {
    match value {
        1 => Some(Parity::None),
        2 => Some(Parity::Odd),
        3 => Some(Parity::Even),
        4 => Some(Parity::Mark),
        5 => Some(Parity::Space),
        _ => None,
    }
}

pub fn stop_bits_to_wire(bits: StopBits) -> u8 {
    match bits {
        StopBits::One => 1,
        StopBits::Two => 2,
        StopBits::OnePointFive => 3,
    }
}

pub fn stop_bits_from_wire(value: u8) -> Option<StopBits> {
    match value {
        1 => Some(StopBits::One),
        2 => Some(StopBits::Two),
        3 => Some(StopBits::OnePointFive),
        _ => None,
    }
}

/// Name of a negotiation verb for log lines
pub fn command_name(command: u8) -> &'static str {
    match command {
        WILL => "WILL",
        WONT => "WONT",
        DO => "DO",
        DONT => "DONT",
        SE => "SE",
        NOP => "NOP",
        DM => "DM",
        BRK => "BRK",
        IP => "IP",
        AO => "AO",
        AYT => "AYT",
        EC => "EC",
        EL => "EL",
        GA => "GA",
        SB => "SB",
        _ => "?",
    }
}
