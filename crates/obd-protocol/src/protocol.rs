//! Vehicle bus selection

use serde::{Deserialize, Serialize};

/// Bus the adapter talks to the ECU over, numbered as in `ATSPn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Let the adapter search (`ATSP0`)
    #[default]
    Auto,
    J1850Pwm,
    J1850Vpw,
    Iso9141_2,
    /// KWP2000, 5-baud init
    Iso14230_4Kwp,
    /// KWP2000, fast init
    Iso14230_4KwpFast,
    /// CAN 11-bit / 500k, the usual choice on post-2008 cars
    Iso15765_4Can11bit500,
    Iso15765_4Can29bit500,
    Iso15765_4Can11bit250,
    Iso15765_4Can29bit250,
}

const SELECT_COMMANDS: [&str; 10] = [
    "ATSP0", "ATSP1", "ATSP2", "ATSP3", "ATSP4", "ATSP5", "ATSP6", "ATSP7", "ATSP8", "ATSP9",
];

impl ObdProtocol {
    /// ELM327 protocol number
    pub fn number(self) -> usize {
        self as usize
    }

    /// Command pinning the adapter to this bus
    pub fn to_elm_command(&self) -> &'static str {
        SELECT_COMMANDS[self.number()]
    }

    /// Reset, echo off, linefeeds off, headers on, then bus selection
    pub fn init_sequence(&self) -> [&'static str; 5] {
        ["ATZ", "ATE0", "ATL0", "ATH1", self.to_elm_command()]
    }
}
