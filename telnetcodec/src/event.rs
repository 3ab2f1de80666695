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

use crate::TelnetOption;
use crate::args::environ::{EnvironCommand, EnvironVar};
use crate::args::ttype::TerminalTypeCommand;
use crate::result::CodecError;
use bytes::Bytes;

///
/// `TelnetEvent` is everything the negotiator reports to its [`crate::EventSink`].
///
/// Incoming traffic produces `Data`, `Command`, negotiation and subnegotiation
/// events. Every byte the negotiator wants written to the peer, including its
/// own negotiation replies, is reported as `Send`.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Application data received from the peer, with Telnet escapes removed
    Data(Bytes),
    /// Wire bytes that must be written to the peer
    Send(Bytes),
    /// A two-byte `IAC <cmd>` command other than negotiation or subnegotiation
    Command(u8),
    /// The peer will perform (or has agreed to perform) an option
    Will(TelnetOption),
    /// The peer will not perform (or has stopped performing) an option
    Wont(TelnetOption),
    /// The peer asks us to perform (or agrees that we perform) an option
    Do(TelnetOption),
    /// The peer asks us to stop (or refuses that we perform) an option
    Dont(TelnetOption),
    /// Raw subnegotiation payload, emitted before any option-specific event
    Subnegotiation {
        /// Option the payload belongs to
        option: TelnetOption,
        /// Bytes between `IAC SB <option>` and `IAC SE`
        payload: Bytes,
    },
    /// Parsed TERMINAL-TYPE subnegotiation
    TerminalType {
        /// `IS` or `SEND`
        command: TerminalTypeCommand,
        /// Terminal name, present only for `IS`
        name: Option<String>,
    },
    /// Parsed ENVIRON or NEW-ENVIRON subnegotiation
    Environ {
        /// Which of the two environment options carried the payload
        option: TelnetOption,
        /// `IS`, `SEND` or `INFO`
        command: EnvironCommand,
        /// Variables in payload order
        values: Vec<EnvironVar>,
    },
    /// Non-fatal protocol irregularity; processing continued
    Warning(CodecError),
    /// Malformed payload that was discarded
    Error(CodecError),
}

impl TelnetEvent {
    /// Data event from a byte slice.
    pub fn data(bytes: &[u8]) -> Self {
        TelnetEvent::Data(Bytes::copy_from_slice(bytes))
    }

    /// Send event from a byte slice.
    pub fn send(bytes: &[u8]) -> Self {
        TelnetEvent::Send(Bytes::copy_from_slice(bytes))
    }

    /// `true` for [`TelnetEvent::Warning`] and [`TelnetEvent::Error`].
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, TelnetEvent::Warning(_) | TelnetEvent::Error(_))
    }
}
