//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::{TelnetOption, consts};
use bytes::Bytes;
use std::fmt::Formatter;

/// Negotiation verb.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetVerb {
    /// Offer to perform an option
    Will,
    /// Refuse or stop performing an option
    Wont,
    /// Ask the peer to perform an option
    Do,
    /// Ask the peer to stop performing an option
    Dont,
}

impl TelnetVerb {
    /// Command byte of the verb.
    pub fn to_u8(self) -> u8 {
        match self {
            TelnetVerb::Will => consts::WILL,
            TelnetVerb::Wont => consts::WONT,
            TelnetVerb::Do => consts::DO,
            TelnetVerb::Dont => consts::DONT,
        }
    }

    /// Verb for a command byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            consts::WILL => Some(TelnetVerb::Will),
            consts::WONT => Some(TelnetVerb::Wont),
            consts::DO => Some(TelnetVerb::Do),
            consts::DONT => Some(TelnetVerb::Dont),
            _ => None,
        }
    }
}

impl std::fmt::Display for TelnetVerb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetVerb::Will => write!(f, "WILL"),
            TelnetVerb::Wont => write!(f, "WONT"),
            TelnetVerb::Do => write!(f, "DO"),
            TelnetVerb::Dont => write!(f, "DONT"),
        }
    }
}

///
/// Outgoing request accepted by the [`crate::TelnetCodec`] encoder.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TelnetFrame {
    /// Binary data; `IAC` is doubled
    Data(Bytes),
    /// Text; `IAC` is doubled and NVT line endings applied unless binary transmit is on
    Text(Bytes),
    /// Bare `IAC <cmd>`
    Command(u8),
    /// Local negotiation request, run through the option state machine
    Negotiate(TelnetVerb, TelnetOption),
    /// Complete `IAC SB <option> payload IAC SE`
    Subnegotiate(TelnetOption, Bytes),
}
