//! TIOCM modem line bitmap and its V.24 translation.

use rfcomm_core::v24;

pub const TIOCM_LE: u32 = 0x001;
pub const TIOCM_DTR: u32 = 0x002;
pub const TIOCM_RTS: u32 = 0x004;
pub const TIOCM_ST: u32 = 0x008;
pub const TIOCM_SR: u32 = 0x010;
pub const TIOCM_CTS: u32 = 0x020;
pub const TIOCM_CD: u32 = 0x040;
pub const TIOCM_RI: u32 = 0x080;
pub const TIOCM_DSR: u32 = 0x100;

/// Pairs of (V.24 signal, TIOCM lines it stands for)
const MAPPING: [(u8, u32); 4] = [
    (v24::RTC, TIOCM_DSR | TIOCM_DTR),
    (v24::RTR, TIOCM_RTS | TIOCM_CTS),
    (v24::IC, TIOCM_RI),
    (v24::DV, TIOCM_CD),
];

/// Translate remote V.24 signals into a TIOCM bitmap
pub fn from_v24(signals: u8) -> u32 {
    MAPPING
        .iter()
        .filter(|(sig, _)| signals & sig != 0)
        .fold(0, |acc, (_, lines)| acc | lines)
}

/// Apply a TIOCMSET-style request to local V.24 signals.
///
/// Either line of a pair toggles the shared signal; `set` is applied before
/// `clear`, so a line named in both ends up cleared.
pub fn apply_to_v24(signals: u8, set: u32, clear: u32) -> u8 {
    let mut out = signals;
    for (sig, lines) in MAPPING {
        if set & lines != 0 {
            out |= sig;
        }
    }
    for (sig, lines) in MAPPING {
        if clear & lines != 0 {
            out &= !sig;
        }
    }
    out
}

/// True when the carrier went from present to absent
pub fn carrier_lost(old_status: u32, new_signals: u8) -> bool {
    old_status & TIOCM_CD != 0 && new_signals & v24::DV == 0
}
