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

//! # Telmux Telnet Option Negotiator
//!
//! A per-connection Telnet (RFC 854) protocol engine. It separates application
//! data from embedded commands, runs the RFC 1143 "Q method" for every option,
//! parses TERMINAL-TYPE and ENVIRON subnegotiations, and escapes outgoing data.
//!
//! ## Core Components
//!
//! ### [`TelnetCodec`]
//!
//! The negotiator. Received bytes go through [`TelnetCodec::receive`], outgoing
//! data through [`TelnetCodec::send`] or [`TelnetCodec::send_text`], and local
//! option requests through [`TelnetCodec::negotiate`]. Everything it produces,
//! including bytes that must be written to the peer, is reported to an
//! [`EventSink`] as a [`TelnetEvent`]. It also implements the `tokio_util`
//! [`Decoder`](tokio_util::codec::Decoder) and
//! [`Encoder<TelnetFrame>`](tokio_util::codec::Encoder).
//!
//! ### [`OptionTable`]
//!
//! Per-option `us`/`him` Q-states plus the table of options this end will
//! agree to perform or let the peer perform. Options never mentioned stay in
//! the `No` state and are refused.
//!
//! ## Usage Example
//!
//! ```rust
//! use telmux_telnetcodec::{
//!     TelnetCodec, TelnetEvent, TelnetFlags, TelnetOption, TelnetSupport, TelnetVerb,
//! };
//!
//! let support = [TelnetSupport::new(TelnetOption::Echo, true, false)];
//! let mut codec = TelnetCodec::with_support(&support, TelnetFlags::default());
//!
//! let mut events = Vec::new();
//! codec.negotiate(TelnetVerb::Will, TelnetOption::Echo, &mut events);
//! assert_eq!(events, vec![TelnetEvent::send(&[255, 251, 1])]);
//!
//! let events = codec.receive_events(&[b'h', b'i', 255, 253, 1]).unwrap();
//! assert_eq!(events[0], TelnetEvent::data(b"hi"));
//! assert_eq!(events[1], TelnetEvent::Do(TelnetOption::Echo));
//! assert!(codec.local_enabled(TelnetOption::Echo));
//! ```
//!
//! ## Diagnostics
//!
//! Negotiation conflicts, bad bytes inside a subnegotiation and oversized
//! subnegotiations are reported as [`TelnetEvent::Warning`]. Malformed
//! TERMINAL-TYPE or ENVIRON payloads are reported as [`TelnetEvent::Error`].
//! Neither stops processing. Only a failure to grow the subnegotiation buffer
//! is returned as an `Err`.
//!
//! ## Related RFCs
//!
//! - RFC 854: Telnet Protocol Specification
//! - RFC 856: Telnet Binary Transmission
//! - RFC 1091: Telnet Terminal-Type Option
//! - RFC 1143: The Q Method of Implementing Telnet Option Negotiation
//! - RFC 1408 / RFC 1572: Telnet Environment Options

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod args;
mod codec;
pub mod consts;
mod event;
mod frame;
mod options;
mod result;
mod sink;

pub use self::args::environ::{EnvironCommand, EnvironVar, EnvironVarKind};
pub use self::args::ttype::TerminalTypeCommand;
pub use self::args::{SUBNEGOTIATION_LIMIT, SUBNEGOTIATION_TIERS, SubnegotiationBuffer};
pub use self::codec::{ParserState, TelnetCodec, TelnetFlags};
pub use self::event::TelnetEvent;
pub use self::frame::{TelnetFrame, TelnetVerb};
pub use self::options::{
    OptionState, OptionTable, QState, TelnetOption, TelnetSide, TelnetSupport,
};
pub use self::result::{CodecError, CodecResult, SubnegotiationErrorKind};
pub use self::sink::{CallbackSink, EventSink};

#[cfg(test)]
mod tests {
    use super::{TelnetCodec, TelnetEvent, TelnetFlags, TelnetOption, TelnetSupport, consts};
    use bytes::BytesMut;
    use tokio_util::codec::Decoder;

    #[test]
    fn telnet_decode() {
        let mut codec = TelnetCodec::new();
        let mut input_buffer = BytesMut::from("Terminated line\r\n");
        let mut actual_output = Vec::new();
        while let Some(event) = codec.decode(&mut input_buffer).unwrap() {
            actual_output.push(event);
        }
        assert_eq!(
            vec![TelnetEvent::data(b"Terminated line\r\n")],
            actual_output,
            "telnet_decode didn't match"
        );
    }

    #[test]
    fn decode_iac_activation() {
        let support = [TelnetSupport::new(TelnetOption::TransmitBinary, true, true)];
        let mut codec =
            TelnetCodec::with_support(&support, TelnetFlags::default().with_nvt_eol(true));
        let mut input = Vec::new();
        input.extend_from_slice(b"Login:\r\n");
        input.extend_from_slice(&[consts::IAC, consts::DO, consts::option::BINARY]);
        input.extend_from_slice(b"Password:\r\n");
        input.extend_from_slice(&[consts::IAC, consts::WILL, consts::option::BINARY]);
        input.extend_from_slice(b"Hello!\r\n");
        let mut input_buffer = BytesMut::from(&input[..]);

        let expected_output = vec![
            TelnetEvent::data(b"Login:"),
            TelnetEvent::data(b"\n"),
            TelnetEvent::send(&[consts::IAC, consts::WILL, consts::option::BINARY]),
            TelnetEvent::Do(TelnetOption::TransmitBinary),
            TelnetEvent::data(b"Password:"),
            TelnetEvent::data(b"\n"),
            TelnetEvent::send(&[consts::IAC, consts::DO, consts::option::BINARY]),
            TelnetEvent::Will(TelnetOption::TransmitBinary),
            // Receiving binary now, CR passes through untranslated
            TelnetEvent::data(b"Hello!\r\n"),
        ];
        let mut actual_output = Vec::new();
        while let Some(event) = codec.decode(&mut input_buffer).unwrap() {
            actual_output.push(event);
        }

        assert_eq!(expected_output, actual_output);
        assert!(codec.transmit_binary());
        assert!(codec.receive_binary());
    }
}
