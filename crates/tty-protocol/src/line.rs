use rfcomm_core::rpn::{self, RemotePortNegotiation};
use serde::{Deserialize, Serialize};

/// Serial line parameters as seen by the port consumer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: ParityMode,
    pub flow_control: FlowControl,
    #[serde(default = "default_xon")]
    pub xon_char: u8,
    #[serde(default = "default_xoff")]
    pub xoff_char: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParityMode {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

fn default_xon() -> u8 {
    rpn::XON_CHAR
}

fn default_xoff() -> u8 {
    rpn::XOFF_CHAR
}

impl Default for LineSettings {
    /// 9600 8N1, the initial line of every port
    fn default() -> Self {
        Self::new_8n1(9600)
    }
}

impl LineSettings {
    /// Create a standard 8N1 configuration at specified baud rate
    pub fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: ParityMode::None,
            flow_control: FlowControl::None,
            xon_char: rpn::XON_CHAR,
            xoff_char: rpn::XOFF_CHAR,
        }
    }

    /// Parse framing string (e.g., "8N1", "7E2") into settings.
    ///
    /// Unrecognized strings fall back to 8N1.
    pub fn from_framing(framing: &str, baud_rate: u32) -> Self {
        let mut settings = Self::new_8n1(baud_rate);
        let mut chars = framing.trim().chars();
        let (Some(data), Some(parity), Some(stop), None) =
            (chars.next(), chars.next(), chars.next(), chars.next())
        else {
            return settings;
        };

        let parity = match parity.to_ascii_uppercase() {
            'N' => ParityMode::None,
            'E' => ParityMode::Even,
            'O' => ParityMode::Odd,
            _ => return settings,
        };
        let (Some(data), Some(stop)) = (data.to_digit(10), stop.to_digit(10)) else {
            return settings;
        };
        if !(5..=8).contains(&data) || !(1..=2).contains(&stop) {
            return settings;
        }

        settings.data_bits = data as u8;
        settings.stop_bits = stop as u8;
        settings.parity = parity;
        settings
    }

    /// RPN bit rate code; rates outside the table negotiate as 9600
    pub fn rpn_baud(&self) -> u8 {
        match self.baud_rate {
            2400 => rpn::BR_2400,
            4800 => rpn::BR_4800,
            7200 => rpn::BR_7200,
            9600 => rpn::BR_9600,
            19200 => rpn::BR_19200,
            38400 => rpn::BR_38400,
            57600 => rpn::BR_57600,
            115200 => rpn::BR_115200,
            230400 => rpn::BR_230400,
            _ => rpn::BR_9600,
        }
    }

    pub fn rpn_data_bits(&self) -> u8 {
        match self.data_bits {
            5 => rpn::DATA_5,
            6 => rpn::DATA_6,
            7 => rpn::DATA_7,
            _ => rpn::DATA_8,
        }
    }

    /// RFCOMM has no 2 stop bits, so a request for 2 becomes 1.5
    pub fn rpn_stop_bits(&self) -> u8 {
        if self.stop_bits >= 2 {
            rpn::STOP_15
        } else {
            rpn::STOP_1
        }
    }

    pub fn rpn_parity(&self) -> u8 {
        match self.parity {
            ParityMode::None => rpn::PARITY_NONE,
            ParityMode::Odd => rpn::PARITY_ODD,
            ParityMode::Even => rpn::PARITY_EVEN,
        }
    }

    /// Build the negotiation request for a change from `old` to `self`.
    ///
    /// Returns `None` when none of the negotiated fields changed. Flow
    /// control is not negotiable and always goes out as none.
    pub fn negotiation_from(&self, old: &LineSettings) -> Option<RemotePortNegotiation> {
        let mut changes: u16 = 0;

        if old.parity != self.parity {
            changes |= rpn::PM_PARITY;
        }
        if old.xon_char != self.xon_char {
            changes |= rpn::PM_XON;
        }
        if old.xoff_char != self.xoff_char {
            changes |= rpn::PM_XOFF;
        }
        if (old.stop_bits >= 2) != (self.stop_bits >= 2) {
            changes |= rpn::PM_STOP;
        }
        if old.data_bits != self.data_bits {
            changes |= rpn::PM_DATA;
        }
        if old.baud_rate != self.baud_rate {
            changes |= rpn::PM_BITRATE;
        }

        if changes == 0 {
            return None;
        }

        Some(RemotePortNegotiation {
            baud: self.rpn_baud(),
            data_bits: self.rpn_data_bits(),
            stop_bits: self.rpn_stop_bits(),
            parity: self.rpn_parity(),
            flow_control: rpn::FLOW_NONE,
            xon_char: if changes & rpn::PM_XON != 0 {
                self.xon_char
            } else {
                rpn::XON_CHAR
            },
            xoff_char: if changes & rpn::PM_XOFF != 0 {
                self.xoff_char
            } else {
                rpn::XOFF_CHAR
            },
            param_mask: changes,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_9600_8n1() {
        let s = LineSettings::default();
        assert_eq!(s.baud_rate, 9600);
        assert_eq!(s.data_bits, 8);
        assert_eq!(s.stop_bits, 1);
        assert_eq!(s.parity, ParityMode::None);
    }

    #[test]
    fn test_from_framing() {
        let s = LineSettings::from_framing("7E2", 19200);
        assert_eq!(s.data_bits, 7);
        assert_eq!(s.parity, ParityMode::Even);
        assert_eq!(s.stop_bits, 2);
        assert_eq!(s.baud_rate, 19200);

        assert_eq!(
            LineSettings::from_framing("Auto", 9600),
            LineSettings::new_8n1(9600)
        );
        assert_eq!(
            LineSettings::from_framing("9N1", 9600),
            LineSettings::new_8n1(9600)
        );
    }

    #[test]
    fn test_unchanged_settings_send_nothing() {
        let s = LineSettings::new_8n1(115200);
        assert!(s.negotiation_from(&s).is_none());
    }

    #[test]
    fn test_flow_control_change_alone_is_not_negotiated() {
        let old = LineSettings::default();
        let mut new = old;
        new.flow_control = FlowControl::Hardware;
        assert!(new.negotiation_from(&old).is_none());
    }

    #[test]
    fn test_baud_change_mask() {
        let old = LineSettings::default();
        let new = LineSettings::new_8n1(115200);
        let req = new.negotiation_from(&old).unwrap();
        assert_eq!(req.param_mask, rpn::PM_BITRATE);
        assert_eq!(req.baud, rpn::BR_115200);
        assert_eq!(req.data_bits, rpn::DATA_8);
        assert_eq!(req.flow_control, rpn::FLOW_NONE);
        assert_eq!(req.xon_char, rpn::XON_CHAR);
        assert_eq!(req.xoff_char, rpn::XOFF_CHAR);
    }

    #[test]
    fn test_unsupported_baud_coerces_to_9600() {
        let old = LineSettings::default();
        let new = LineSettings::new_8n1(31250);
        let req = new.negotiation_from(&old).unwrap();
        assert_eq!(req.baud, rpn::BR_9600);
        assert_eq!(req.param_mask, rpn::PM_BITRATE);
    }

    #[test]
    fn test_two_stop_bits_become_one_and_a_half() {
        let old = LineSettings::default();
        let mut new = old;
        new.stop_bits = 2;
        new.parity = ParityMode::Odd;
        let req = new.negotiation_from(&old).unwrap();
        assert_eq!(req.stop_bits, rpn::STOP_15);
        assert_eq!(req.parity, rpn::PARITY_ODD);
        assert_eq!(req.param_mask, rpn::PM_STOP | rpn::PM_PARITY);
    }

    #[test]
    fn test_custom_xon_xoff() {
        let old = LineSettings::default();
        let mut new = old;
        new.xon_char = 0x01;
        let req = new.negotiation_from(&old).unwrap();
        assert_eq!(req.param_mask, rpn::PM_XON);
        assert_eq!(req.xon_char, 0x01);
        assert_eq!(req.xoff_char, rpn::XOFF_CHAR);
    }

    #[test]
    fn test_odd_data_bits_coerce_to_eight() {
        let mut s = LineSettings::default();
        s.data_bits = 9;
        assert_eq!(s.rpn_data_bits(), rpn::DATA_8);
        s.data_bits = 5;
        assert_eq!(s.rpn_data_bits(), rpn::DATA_5);
    }

    #[test]
    fn test_deserialize_without_xon_fields() {
        let json = r#"{"baud_rate":57600,"data_bits":8,"stop_bits":1,"parity":"None","flow_control":"Software"}"#;
        let s: LineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.xon_char, rpn::XON_CHAR);
        assert_eq!(s.xoff_char, rpn::XOFF_CHAR);
        assert_eq!(s.flow_control, FlowControl::Software);
    }
}
