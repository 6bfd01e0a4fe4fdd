//! Remote port negotiation (RPN) field encodings.

pub const BR_2400: u8 = 0x0;
pub const BR_4800: u8 = 0x1;
pub const BR_7200: u8 = 0x2;
pub const BR_9600: u8 = 0x3;
pub const BR_19200: u8 = 0x4;
pub const BR_38400: u8 = 0x5;
pub const BR_57600: u8 = 0x6;
pub const BR_115200: u8 = 0x7;
pub const BR_230400: u8 = 0x8;

pub const DATA_5: u8 = 0x0;
pub const DATA_6: u8 = 0x1;
pub const DATA_7: u8 = 0x2;
pub const DATA_8: u8 = 0x3;

pub const STOP_1: u8 = 0;
pub const STOP_15: u8 = 1;

pub const PARITY_NONE: u8 = 0x0;
pub const PARITY_ODD: u8 = 0x1;
pub const PARITY_EVEN: u8 = 0x3;

pub const FLOW_NONE: u8 = 0x00;

pub const XON_CHAR: u8 = 0x11;
pub const XOFF_CHAR: u8 = 0x13;

// Parameter mask bits: which fields the request asks to change
pub const PM_BITRATE: u16 = 0x0001;
pub const PM_DATA: u16 = 0x0002;
pub const PM_STOP: u16 = 0x0004;
pub const PM_PARITY: u16 = 0x0008;
pub const PM_PARITY_TYPE: u16 = 0x0010;
pub const PM_XON: u16 = 0x0020;
pub const PM_XOFF: u16 = 0x0040;
pub const PM_FLOW: u16 = 0x3F00;

/// One RPN request as handed to [`crate::Link::send_rpn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePortNegotiation {
    pub baud: u8,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: u8,
    pub flow_control: u8,
    pub xon_char: u8,
    pub xoff_char: u8,
    pub param_mask: u16,
}
