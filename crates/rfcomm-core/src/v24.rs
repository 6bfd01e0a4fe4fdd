//! V.24 signal bits carried in RFCOMM modem status commands.

/// Flow control (remote cannot accept frames)
pub const FC: u8 = 0x02;
/// Ready to communicate (DSR/DTR)
pub const RTC: u8 = 0x04;
/// Ready to receive (RTS/CTS)
pub const RTR: u8 = 0x08;
/// Incoming call (RI)
pub const IC: u8 = 0x40;
/// Data valid (CD)
pub const DV: u8 = 0x80;
