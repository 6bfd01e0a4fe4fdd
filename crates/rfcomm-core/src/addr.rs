use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const ANY: BdAddr = BdAddr([0; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid Bluetooth address '{0}': expected six colon-separated hex octets (AA:BB:CC:DD:EE:FF)")]
pub struct AddrParseError(pub String);

impl FromStr for BdAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| AddrParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(AddrParseError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddrParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(AddrParseError(s.to_string()));
        }
        Ok(Self(bytes))
    }
}
