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

use crate::args::{Buffered, SUBNEGOTIATION_LIMIT, SubnegotiationBuffer, environ, ttype};
use crate::options::{OptionTable, QState, TelnetSide, TelnetSupport};
use crate::result::{CodecError, CodecResult, SubnegotiationErrorKind};
use crate::{EventSink, TelnetEvent, TelnetFrame, TelnetOption, TelnetVerb, consts};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Behaviour switches for a [`TelnetCodec`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TelnetFlags {
    /// Report negotiation commands as events without answering or tracking them
    pub proxy: bool,
    /// Translate received `CR LF` to `\n` and `CR NUL` to `\r` unless receiving binary
    pub nvt_eol: bool,
}

impl TelnetFlags {
    /// Set proxy mode.
    pub fn with_proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    /// Set NVT end-of-line translation.
    pub fn with_nvt_eol(mut self, nvt_eol: bool) -> Self {
        self.nvt_eol = nvt_eol;
        self
    }
}

/// Position of the byte-at-a-time receive scanner.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ParserState {
    /// Plain data
    #[default]
    Data,
    /// `CR` seen with NVT translation active
    Eol,
    /// `IAC` seen
    Iac,
    /// `IAC WILL` seen
    Will,
    /// `IAC WONT` seen
    Wont,
    /// `IAC DO` seen
    Do,
    /// `IAC DONT` seen
    Dont,
    /// `IAC SB` seen, option byte next
    Sb,
    /// Collecting subnegotiation payload
    SbData,
    /// `IAC` seen inside a subnegotiation
    SbDataIac,
}

///
/// Per-connection Telnet option negotiator.
///
/// Incoming bytes are fed to [`TelnetCodec::receive`], which reports data,
/// commands, negotiation and subnegotiation through an [`EventSink`] and keeps
/// the RFC 1143 state of every option it sees. Outgoing data and requests go
/// through [`TelnetCodec::send`], [`TelnetCodec::send_text`] and
/// [`TelnetCodec::negotiate`]; the resulting wire bytes are reported as
/// [`TelnetEvent::Send`].
///
/// The codec also implements [`Decoder`] and [`Encoder<TelnetFrame>`] so it can
/// sit inside a framed transport.
///
#[derive(Clone, Debug, Default)]
pub struct TelnetCodec {
    state: ParserState,
    options: OptionTable,
    flags: TelnetFlags,
    transmit_binary: bool,
    receive_binary: bool,
    sb_option: Option<TelnetOption>,
    sb_buffer: SubnegotiationBuffer,
    pending: VecDeque<TelnetEvent>,
}

impl TelnetCodec {
    /// Negotiator that refuses every option and uses no flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiator with an option support table and flags.
    pub fn with_support(support: &[TelnetSupport], flags: TelnetFlags) -> Self {
        Self {
            options: OptionTable::with_support(support),
            flags,
            ..Self::default()
        }
    }

    /// Current flags.
    pub fn flags(&self) -> TelnetFlags {
        self.flags
    }

    /// Switch proxy mode on or off.
    pub fn set_proxy(&mut self, proxy: bool) {
        self.flags.proxy = proxy;
    }

    /// Current receive scanner state.
    pub fn parser_state(&self) -> ParserState {
        self.state
    }

    /// The option table.
    pub fn options(&self) -> &OptionTable {
        &self.options
    }

    /// Q-state of one side of an option.
    pub fn qstate(&self, option: TelnetOption, side: TelnetSide) -> QState {
        self.options.qstate(option, side)
    }

    /// Whether we currently perform `option`.
    pub fn local_enabled(&self, option: TelnetOption) -> bool {
        self.qstate(option, TelnetSide::Local).is_enabled()
    }

    /// Whether the peer currently performs `option`.
    pub fn remote_enabled(&self, option: TelnetOption) -> bool {
        self.qstate(option, TelnetSide::Remote).is_enabled()
    }

    /// `true` once we transmit in BINARY mode; disables NVT translation in [`TelnetCodec::send_text`].
    pub fn transmit_binary(&self) -> bool {
        self.transmit_binary
    }

    /// `true` once the peer transmits in BINARY mode; disables NVT receive translation.
    pub fn receive_binary(&self) -> bool {
        self.receive_binary
    }

    /// Return to the freshly connected state, keeping support table and flags.
    pub fn reset(&mut self) {
        self.state = ParserState::Data;
        self.options.reset();
        self.transmit_binary = false;
        self.receive_binary = false;
        self.sb_option = None;
        self.sb_buffer.clear();
        self.pending.clear();
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Scan received bytes, reporting everything found to `sink`.
    ///
    /// Runs of literal data are reported as single [`TelnetEvent::Data`]
    /// events; a run is flushed before any command so byte order is kept.
    ///
    /// # Errors
    ///
    /// [`CodecError::AllocationFailed`] when the subnegotiation buffer cannot
    /// grow. The subnegotiation in progress is discarded, the scanner returns
    /// to the data state and the rest of `input` is not processed.
    pub fn receive<S>(&mut self, input: &[u8], sink: &mut S) -> CodecResult<()>
    where
        S: EventSink + ?Sized,
    {
        let mut start = 0;
        for (i, &byte) in input.iter().enumerate() {
            match self.state {
                ParserState::Data => self.data_byte(input, i, &mut start, sink),
                ParserState::Eol => {
                    self.state = ParserState::Data;
                    match byte {
                        consts::LF => start = i,
                        consts::NUL => {
                            sink.on_event(TelnetEvent::data(b"\r"));
                            start = i + 1;
                        }
                        _ => {
                            sink.on_event(TelnetEvent::data(b"\r"));
                            start = i;
                            self.data_byte(input, i, &mut start, sink);
                        }
                    }
                }
                ParserState::Iac => {
                    self.iac_byte(byte, sink);
                    start = i + 1;
                }
                ParserState::Will | ParserState::Wont | ParserState::Do | ParserState::Dont => {
                    let verb = match self.state {
                        ParserState::Will => TelnetVerb::Will,
                        ParserState::Wont => TelnetVerb::Wont,
                        ParserState::Do => TelnetVerb::Do,
                        _ => TelnetVerb::Dont,
                    };
                    self.state = ParserState::Data;
                    self.negotiate_received(verb, TelnetOption::from_u8(byte), sink);
                    start = i + 1;
                }
                ParserState::Sb => {
                    self.sb_option = Some(TelnetOption::from_u8(byte));
                    self.sb_buffer.clear();
                    self.state = ParserState::SbData;
                    start = i + 1;
                }
                ParserState::SbData => {
                    if byte == consts::IAC {
                        self.state = ParserState::SbDataIac;
                    } else {
                        self.buffer_byte(byte, sink)?;
                    }
                    start = i + 1;
                }
                ParserState::SbDataIac => {
                    match byte {
                        consts::SE => {
                            self.state = ParserState::Data;
                            self.dispatch_subnegotiation(sink);
                        }
                        consts::IAC => {
                            self.state = ParserState::SbData;
                            self.buffer_byte(consts::IAC, sink)?;
                        }
                        other => {
                            let error = CodecError::UnexpectedByteInSubnegotiation(other);
                            warn!(byte = other, "{}", error);
                            sink.on_event(TelnetEvent::Warning(error));
                            self.dispatch_subnegotiation(sink);
                            self.iac_byte(other, sink);
                        }
                    }
                    start = i + 1;
                }
            }
        }
        if self.state == ParserState::Data && start < input.len() {
            sink.on_event(TelnetEvent::data(&input[start..]));
        }
        Ok(())
    }

    /// Convenience form of [`TelnetCodec::receive`] collecting the events.
    pub fn receive_events(&mut self, input: &[u8]) -> CodecResult<Vec<TelnetEvent>> {
        let mut events = Vec::new();
        self.receive(input, &mut events)?;
        Ok(events)
    }

    fn data_byte<S>(&mut self, input: &[u8], i: usize, start: &mut usize, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let byte = input[i];
        let eol = byte == consts::CR && self.flags.nvt_eol && !self.receive_binary;
        if byte == consts::IAC || eol {
            if *start < i {
                sink.on_event(TelnetEvent::data(&input[*start..i]));
            }
            self.state = if eol {
                ParserState::Eol
            } else {
                ParserState::Iac
            };
        }
    }

    fn iac_byte<S>(&mut self, byte: u8, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        self.state = match byte {
            consts::SB => ParserState::Sb,
            consts::WILL => ParserState::Will,
            consts::WONT => ParserState::Wont,
            consts::DO => ParserState::Do,
            consts::DONT => ParserState::Dont,
            consts::IAC => {
                sink.on_event(TelnetEvent::data(&[consts::IAC]));
                ParserState::Data
            }
            command => {
                trace!(command, "telnet command");
                sink.on_event(TelnetEvent::Command(command));
                ParserState::Data
            }
        };
    }

    fn buffer_byte<S>(&mut self, byte: u8, sink: &mut S) -> CodecResult<()>
    where
        S: EventSink + ?Sized,
    {
        match self.sb_buffer.push(byte) {
            Ok(Buffered::Stored) => Ok(()),
            Ok(Buffered::Overflow) => {
                let error = CodecError::SubnegotiationOverflow {
                    option: self.sb_option.unwrap_or(TelnetOption::Unknown(0)),
                    limit: SUBNEGOTIATION_LIMIT,
                };
                warn!("{}", error);
                sink.on_event(TelnetEvent::Warning(error));
                self.abort_subnegotiation();
                Ok(())
            }
            Err(error) => {
                warn!("{}", error);
                self.abort_subnegotiation();
                Err(error)
            }
        }
    }

    fn abort_subnegotiation(&mut self) {
        self.sb_buffer.clear();
        self.sb_option = None;
        self.state = ParserState::Data;
    }

    fn dispatch_subnegotiation<S>(&mut self, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let Some(option) = self.sb_option.take() else {
            return;
        };
        let payload = Bytes::copy_from_slice(self.sb_buffer.as_slice());
        self.sb_buffer.clear();
        sink.on_event(TelnetEvent::Subnegotiation {
            option,
            payload: payload.clone(),
        });

        match option {
            TelnetOption::TTYPE => match ttype::parse(&payload) {
                Ok((command, name)) => sink.on_event(TelnetEvent::TerminalType { command, name }),
                Err(reason) => Self::malformed(option, reason, sink),
            },
            TelnetOption::Environment | TelnetOption::NewEnvironment => {
                match environ::parse(&payload) {
                    Ok(Some((command, values))) => sink.on_event(TelnetEvent::Environ {
                        option,
                        command,
                        values,
                    }),
                    Ok(None) => {}
                    Err(reason) => Self::malformed(option, reason, sink),
                }
            }
            _ => {}
        }
    }

    fn malformed<S>(option: TelnetOption, reason: SubnegotiationErrorKind, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let error = CodecError::SubnegotiationError { option, reason };
        warn!("{}", error);
        sink.on_event(TelnetEvent::Error(error));
    }

    // ========================================================================
    // RFC 1143
    // ========================================================================

    fn set_qstate(&mut self, option: TelnetOption, side: TelnetSide, qstate: QState) {
        self.options.set(option, side, qstate);
        if option == TelnetOption::TransmitBinary {
            self.transmit_binary = self.options.qstate(option, TelnetSide::Local) == QState::Yes;
            self.receive_binary = self.options.qstate(option, TelnetSide::Remote) == QState::Yes;
        }
    }

    fn send_negotiation<S>(verb: TelnetVerb, option: TelnetOption, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        sink.on_event(TelnetEvent::send(&[
            consts::IAC,
            verb.to_u8(),
            option.to_u8(),
        ]));
    }

    fn conflict<S>(option: TelnetOption, reason: &'static str, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        warn!(%option, "{}", reason);
        sink.on_event(TelnetEvent::Warning(CodecError::NegotiationConflict {
            option,
            reason,
        }));
    }

    fn negotiate_received<S>(&mut self, verb: TelnetVerb, option: TelnetOption, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        trace!(%verb, %option, "negotiation received");
        if self.flags.proxy {
            sink.on_event(match verb {
                TelnetVerb::Will => TelnetEvent::Will(option),
                TelnetVerb::Wont => TelnetEvent::Wont(option),
                TelnetVerb::Do => TelnetEvent::Do(option),
                TelnetVerb::Dont => TelnetEvent::Dont(option),
            });
            return;
        }

        match verb {
            TelnetVerb::Will => self.received_offer(
                option,
                TelnetSide::Remote,
                (TelnetVerb::Do, TelnetVerb::Dont),
                (TelnetEvent::Will(option), TelnetEvent::Wont(option)),
                "DONT answered by WILL",
                sink,
            ),
            TelnetVerb::Do => self.received_offer(
                option,
                TelnetSide::Local,
                (TelnetVerb::Will, TelnetVerb::Wont),
                (TelnetEvent::Do(option), TelnetEvent::Dont(option)),
                "WONT answered by DO",
                sink,
            ),
            TelnetVerb::Wont => self.received_refusal(
                option,
                TelnetSide::Remote,
                (TelnetVerb::Do, TelnetVerb::Dont),
                TelnetEvent::Wont(option),
                sink,
            ),
            TelnetVerb::Dont => self.received_refusal(
                option,
                TelnetSide::Local,
                (TelnetVerb::Will, TelnetVerb::Wont),
                TelnetEvent::Dont(option),
                sink,
            ),
        }
    }

    /// Received `WILL` (remote side) or `DO` (local side).
    ///
    /// `replies` is the (accept, refuse) verb pair and `events` the
    /// (enabled, disabled) event pair for the side.
    fn received_offer<S>(
        &mut self,
        option: TelnetOption,
        side: TelnetSide,
        replies: (TelnetVerb, TelnetVerb),
        events: (TelnetEvent, TelnetEvent),
        conflict: &'static str,
        sink: &mut S,
    ) where
        S: EventSink + ?Sized,
    {
        let (accept, refuse) = replies;
        let (enabled, disabled) = events;
        match self.options.qstate(option, side) {
            QState::No => {
                let supported = match side {
                    TelnetSide::Local => self.options.supports_local(option),
                    TelnetSide::Remote => self.options.supports_remote(option),
                };
                if supported {
                    self.set_qstate(option, side, QState::Yes);
                    Self::send_negotiation(accept, option, sink);
                    sink.on_event(enabled);
                } else {
                    Self::send_negotiation(refuse, option, sink);
                }
            }
            QState::Yes => {}
            QState::WantNo => {
                self.set_qstate(option, side, QState::No);
                sink.on_event(disabled);
                Self::conflict(option, conflict, sink);
            }
            QState::WantNoOpposite => {
                self.set_qstate(option, side, QState::Yes);
                Self::conflict(option, conflict, sink);
            }
            QState::WantYes => {
                self.set_qstate(option, side, QState::Yes);
                sink.on_event(enabled);
            }
            QState::WantYesOpposite => {
                self.set_qstate(option, side, QState::WantNo);
                Self::send_negotiation(refuse, option, sink);
                sink.on_event(enabled);
            }
        }
    }

    /// Received `WONT` (remote side) or `DONT` (local side).
    fn received_refusal<S>(
        &mut self,
        option: TelnetOption,
        side: TelnetSide,
        replies: (TelnetVerb, TelnetVerb),
        disabled: TelnetEvent,
        sink: &mut S,
    ) where
        S: EventSink + ?Sized,
    {
        let (accept, refuse) = replies;
        match self.options.qstate(option, side) {
            QState::No => {}
            QState::Yes => {
                self.set_qstate(option, side, QState::No);
                Self::send_negotiation(refuse, option, sink);
                sink.on_event(disabled);
            }
            QState::WantNo => {
                self.set_qstate(option, side, QState::No);
                sink.on_event(disabled);
            }
            QState::WantNoOpposite => {
                self.set_qstate(option, side, QState::WantYes);
                Self::send_negotiation(accept, option, sink);
                sink.on_event(disabled);
            }
            QState::WantYes | QState::WantYesOpposite => {
                self.set_qstate(option, side, QState::No);
            }
        }
    }

    /// Ask for an option change using the Q method.
    ///
    /// `Will`/`Wont` act on our side, `Do`/`Dont` on the peer's. A request that
    /// matches the current or pending state sends nothing. In proxy mode the
    /// command is sent as-is.
    pub fn negotiate<S>(&mut self, verb: TelnetVerb, option: TelnetOption, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        if self.flags.proxy {
            Self::send_negotiation(verb, option, sink);
            return;
        }
        let side = match verb {
            TelnetVerb::Will | TelnetVerb::Wont => TelnetSide::Local,
            TelnetVerb::Do | TelnetVerb::Dont => TelnetSide::Remote,
        };
        let current = self.options.qstate(option, side);
        match verb {
            TelnetVerb::Will | TelnetVerb::Do => match current {
                QState::No => {
                    self.set_qstate(option, side, QState::WantYes);
                    Self::send_negotiation(verb, option, sink);
                }
                QState::WantNo => self.set_qstate(option, side, QState::WantNoOpposite),
                QState::WantYesOpposite => self.set_qstate(option, side, QState::WantYes),
                QState::Yes | QState::WantYes | QState::WantNoOpposite => {}
            },
            TelnetVerb::Wont | TelnetVerb::Dont => match current {
                QState::Yes => {
                    self.set_qstate(option, side, QState::WantNo);
                    Self::send_negotiation(verb, option, sink);
                }
                QState::WantYes => self.set_qstate(option, side, QState::WantYesOpposite),
                QState::WantNoOpposite => self.set_qstate(option, side, QState::WantNo),
                QState::No | QState::WantNo | QState::WantYesOpposite => {}
            },
        }
    }

    // ========================================================================
    // Send
    // ========================================================================

    fn escape_into(dst: &mut BytesMut, data: &[u8], nvt: bool) {
        dst.reserve(data.len());
        for &byte in data {
            match byte {
                consts::IAC => dst.put_slice(&[consts::IAC, consts::IAC]),
                consts::CR if nvt => dst.put_slice(&[consts::CR, consts::NUL]),
                consts::LF if nvt => dst.put_slice(&[consts::CR, consts::LF]),
                other => dst.put_u8(other),
            }
        }
    }

    fn emit<S>(wire: BytesMut, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        if !wire.is_empty() {
            sink.on_event(TelnetEvent::Send(wire.freeze()));
        }
    }

    /// Send binary data, doubling every `IAC`.
    pub fn send<S>(&mut self, data: &[u8], sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let mut wire = BytesMut::new();
        Self::escape_into(&mut wire, data, false);
        Self::emit(wire, sink);
    }

    /// Send text, doubling every `IAC` and, unless transmitting binary,
    /// writing `\r` as `CR NUL` and `\n` as `CR LF`.
    pub fn send_text<S>(&mut self, text: &[u8], sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let mut wire = BytesMut::new();
        Self::escape_into(&mut wire, text, !self.transmit_binary);
        Self::emit(wire, sink);
    }

    /// Format and send text with NVT line endings regardless of binary mode.
    ///
    /// Returns the length of the formatted text before escaping.
    pub fn send_fmt<S>(&mut self, args: std::fmt::Arguments<'_>, sink: &mut S) -> usize
    where
        S: EventSink + ?Sized,
    {
        let text = std::fmt::format(args);
        let mut wire = BytesMut::new();
        Self::escape_into(&mut wire, text.as_bytes(), true);
        Self::emit(wire, sink);
        text.len()
    }

    /// Send `IAC <command>`.
    pub fn iac<S>(&mut self, command: u8, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        sink.on_event(TelnetEvent::send(&[consts::IAC, command]));
    }

    /// Send `IAC SB <option>`.
    pub fn begin_sb<S>(&mut self, option: TelnetOption, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        sink.on_event(TelnetEvent::send(&[consts::IAC, consts::SB, option.to_u8()]));
    }

    /// Send `IAC SE`.
    pub fn finish_sb<S>(&mut self, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        self.iac(consts::SE, sink);
    }

    /// Send a complete subnegotiation with an escaped payload.
    pub fn subnegotiation<S>(&mut self, option: TelnetOption, payload: &[u8], sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let mut wire = BytesMut::with_capacity(payload.len() + 5);
        wire.put_slice(&[consts::IAC, consts::SB, option.to_u8()]);
        Self::escape_into(&mut wire, payload, false);
        wire.put_slice(&[consts::IAC, consts::SE]);
        Self::emit(wire, sink);
    }

    /// Ask the peer for its terminal type.
    pub fn ttype_send<S>(&mut self, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        self.subnegotiation(TelnetOption::TTYPE, &[consts::ttype::SEND], sink);
    }

    /// Report our terminal type.
    pub fn ttype_is<S>(&mut self, name: &str, sink: &mut S)
    where
        S: EventSink + ?Sized,
    {
        let mut payload = Vec::with_capacity(name.len() + 1);
        payload.push(consts::ttype::IS);
        payload.extend_from_slice(name.as_bytes());
        self.subnegotiation(TelnetOption::TTYPE, &payload, sink);
    }
}

/// Writes `Send` events to the encoder output and queues the rest.
struct WireSink<'a> {
    dst: &'a mut BytesMut,
    pending: &'a mut VecDeque<TelnetEvent>,
}

impl EventSink for WireSink<'_> {
    fn on_event(&mut self, event: TelnetEvent) {
        match event {
            TelnetEvent::Send(bytes) => self.dst.extend_from_slice(&bytes),
            other => self.pending.push_back(other),
        }
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    /// Scans everything in `src` and yields the resulting events one at a time.
    ///
    /// Negotiation replies appear as [`TelnetEvent::Send`] and must be written
    /// back to the peer by the caller.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let input = src.split().freeze();
            let mut pending = std::mem::take(&mut self.pending);
            let result = self.receive(&input, &mut pending);
            self.pending = pending;
            result?;
        }
        Ok(self.pending.pop_front())
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut pending = std::mem::take(&mut self.pending);
        {
            let mut sink = WireSink {
                dst,
                pending: &mut pending,
            };
            match frame {
                TelnetFrame::Data(data) => self.send(&data, &mut sink),
                TelnetFrame::Text(text) => self.send_text(&text, &mut sink),
                TelnetFrame::Command(command) => self.iac(command, &mut sink),
                TelnetFrame::Negotiate(verb, option) => self.negotiate(verb, option, &mut sink),
                TelnetFrame::Subnegotiate(option, payload) => {
                    self.subnegotiation(option, &payload, &mut sink)
                }
            }
        }
        self.pending = pending;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::environ::{EnvironCommand, EnvironVar, EnvironVarKind};
    use crate::args::ttype::TerminalTypeCommand;
    use consts::{DO, DONT, IAC, SB, SE, WILL, WONT};
    use tracing_test::traced_test;

    // ========================================================================
    // Helper Functions
    // ========================================================================

    fn supporting(option: TelnetOption) -> TelnetCodec {
        TelnetCodec::with_support(
            &[TelnetSupport::new(option, true, true)],
            TelnetFlags::default(),
        )
    }

    fn sent(bytes: &[u8]) -> TelnetEvent {
        TelnetEvent::send(bytes)
    }

    fn wire(events: &[TelnetEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                TelnetEvent::Send(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn data(events: &[TelnetEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                TelnetEvent::Data(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    // ========================================================================
    // Data and commands
    // ========================================================================

    #[test]
    fn test_data_runs_split_around_escaped_iac() {
        let mut codec = TelnetCodec::new();
        let events = codec.receive_events(&[b'A', b'B', IAC, IAC, b'C']).unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::data(b"AB"),
                TelnetEvent::data(&[0xFF]),
                TelnetEvent::data(b"C"),
            ]
        );
    }

    #[test]
    fn test_two_byte_command() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[b'x', IAC, consts::AYT, b'y'])
            .unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::data(b"x"),
                TelnetEvent::Command(consts::AYT),
                TelnetEvent::data(b"y"),
            ]
        );
    }

    #[test]
    fn test_command_split_across_reads() {
        let mut codec = TelnetCodec::new();
        assert_eq!(codec.receive_events(&[b'a', IAC]).unwrap(), vec![TelnetEvent::data(b"a")]);
        assert_eq!(codec.parser_state(), ParserState::Iac);
        assert_eq!(
            codec.receive_events(&[consts::NOP, b'b']).unwrap(),
            vec![TelnetEvent::Command(consts::NOP), TelnetEvent::data(b"b")]
        );
    }

    #[test]
    fn test_nvt_eol_translation() {
        let mut codec =
            TelnetCodec::with_support(&[], TelnetFlags::default().with_nvt_eol(true));
        let events = codec.receive_events(b"a\r\nb\r\0c\rd").unwrap();
        assert_eq!(data(&events), b"a\nb\rc\rd".to_vec());
    }

    #[test]
    fn test_nvt_eol_cr_before_iac() {
        let mut codec =
            TelnetCodec::with_support(&[], TelnetFlags::default().with_nvt_eol(true));
        let events = codec.receive_events(&[b'\r', IAC, IAC]).unwrap();
        assert_eq!(data(&events), vec![b'\r', 0xFF]);
    }

    #[test]
    fn test_cr_untouched_without_nvt_eol() {
        let mut codec = TelnetCodec::new();
        let events = codec.receive_events(b"a\r\0b").unwrap();
        assert_eq!(data(&events), b"a\r\0b".to_vec());
    }

    // ========================================================================
    // Received negotiation (full RFC 1143 tables)
    // ========================================================================

    struct Row {
        verb: u8,
        side: TelnetSide,
        before: QState,
        after: QState,
        expect: fn(TelnetOption) -> Vec<TelnetEvent>,
    }

    fn conflict(option: TelnetOption, reason: &'static str) -> TelnetEvent {
        TelnetEvent::Warning(CodecError::NegotiationConflict { option, reason })
    }

    fn rfc1143_rows() -> Vec<Row> {
        use QState::*;
        use TelnetSide::{Local, Remote};
        vec![
            // WILL
            Row { verb: WILL, side: Remote, before: No, after: Yes, expect: |o| vec![sent(&[IAC, DO, o.to_u8()]), TelnetEvent::Will(o)] },
            Row { verb: WILL, side: Remote, before: Yes, after: Yes, expect: |_| vec![] },
            Row { verb: WILL, side: Remote, before: WantNo, after: No, expect: |o| vec![TelnetEvent::Wont(o), conflict(o, "DONT answered by WILL")] },
            Row { verb: WILL, side: Remote, before: WantNoOpposite, after: Yes, expect: |o| vec![conflict(o, "DONT answered by WILL")] },
            Row { verb: WILL, side: Remote, before: WantYes, after: Yes, expect: |o| vec![TelnetEvent::Will(o)] },
            Row { verb: WILL, side: Remote, before: WantYesOpposite, after: WantNo, expect: |o| vec![sent(&[IAC, DONT, o.to_u8()]), TelnetEvent::Will(o)] },
            // WONT
            Row { verb: WONT, side: Remote, before: No, after: No, expect: |_| vec![] },
            Row { verb: WONT, side: Remote, before: Yes, after: No, expect: |o| vec![sent(&[IAC, DONT, o.to_u8()]), TelnetEvent::Wont(o)] },
            Row { verb: WONT, side: Remote, before: WantNo, after: No, expect: |o| vec![TelnetEvent::Wont(o)] },
            Row { verb: WONT, side: Remote, before: WantNoOpposite, after: WantYes, expect: |o| vec![sent(&[IAC, DO, o.to_u8()]), TelnetEvent::Wont(o)] },
            Row { verb: WONT, side: Remote, before: WantYes, after: No, expect: |_| vec![] },
            Row { verb: WONT, side: Remote, before: WantYesOpposite, after: No, expect: |_| vec![] },
            // DO
            Row { verb: DO, side: Local, before: No, after: Yes, expect: |o| vec![sent(&[IAC, WILL, o.to_u8()]), TelnetEvent::Do(o)] },
            Row { verb: DO, side: Local, before: Yes, after: Yes, expect: |_| vec![] },
            Row { verb: DO, side: Local, before: WantNo, after: No, expect: |o| vec![TelnetEvent::Dont(o), conflict(o, "WONT answered by DO")] },
            Row { verb: DO, side: Local, before: WantNoOpposite, after: Yes, expect: |o| vec![conflict(o, "WONT answered by DO")] },
            Row { verb: DO, side: Local, before: WantYes, after: Yes, expect: |o| vec![TelnetEvent::Do(o)] },
            Row { verb: DO, side: Local, before: WantYesOpposite, after: WantNo, expect: |o| vec![sent(&[IAC, WONT, o.to_u8()]), TelnetEvent::Do(o)] },
            // DONT
            Row { verb: DONT, side: Local, before: No, after: No, expect: |_| vec![] },
            Row { verb: DONT, side: Local, before: Yes, after: No, expect: |o| vec![sent(&[IAC, WONT, o.to_u8()]), TelnetEvent::Dont(o)] },
            Row { verb: DONT, side: Local, before: WantNo, after: No, expect: |o| vec![TelnetEvent::Dont(o)] },
            Row { verb: DONT, side: Local, before: WantNoOpposite, after: WantYes, expect: |o| vec![sent(&[IAC, WILL, o.to_u8()]), TelnetEvent::Dont(o)] },
            Row { verb: DONT, side: Local, before: WantYes, after: No, expect: |_| vec![] },
            Row { verb: DONT, side: Local, before: WantYesOpposite, after: No, expect: |_| vec![] },
        ]
    }

    #[test]
    fn test_rfc1143_received_tables_are_complete() {
        let option = TelnetOption::SuppressGoAhead;
        let rows = rfc1143_rows();
        assert_eq!(rows.len(), 24);
        for row in rows {
            let mut codec = supporting(option);
            codec.set_qstate(option, row.side, row.before);
            let events = codec
                .receive_events(&[IAC, row.verb, option.to_u8()])
                .unwrap();
            assert_eq!(
                codec.qstate(option, row.side),
                row.after,
                "verb {} from {}",
                row.verb,
                row.before
            );
            assert_eq!(events, (row.expect)(option), "verb {} from {}", row.verb, row.before);
        }
    }

    #[test]
    fn test_unsupported_offers_are_refused() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[IAC, WILL, 31, IAC, DO, 31])
            .unwrap();
        assert_eq!(wire(&events), vec![IAC, DONT, 31, IAC, WONT, 31]);
        assert_eq!(codec.qstate(TelnetOption::NAWS, TelnetSide::Remote), QState::No);
        assert_eq!(codec.qstate(TelnetOption::NAWS, TelnetSide::Local), QState::No);
    }

    #[test]
    fn test_echo_offer_answered_by_do() {
        let mut codec = supporting(TelnetOption::Echo);
        let mut events = Vec::new();
        codec.negotiate(TelnetVerb::Will, TelnetOption::Echo, &mut events);
        assert_eq!(events, vec![sent(&[IAC, WILL, 1])]);
        assert_eq!(codec.qstate(TelnetOption::Echo, TelnetSide::Local), QState::WantYes);

        let events = codec.receive_events(&[IAC, DO, 1]).unwrap();
        assert_eq!(events, vec![TelnetEvent::Do(TelnetOption::Echo)]);
        assert_eq!(codec.qstate(TelnetOption::Echo, TelnetSide::Local), QState::Yes);
    }

    #[test]
    #[traced_test]
    fn test_conflict_is_logged() {
        let mut codec = supporting(TelnetOption::Echo);
        codec.set_qstate(TelnetOption::Echo, TelnetSide::Remote, QState::WantNo);
        codec.receive_events(&[IAC, WILL, 1]).unwrap();
        assert!(logs_contain("DONT answered by WILL"));
    }

    #[test]
    fn test_proxy_mode_reports_without_answering() {
        let mut codec =
            TelnetCodec::with_support(&[], TelnetFlags::default().with_proxy(true));
        let events = codec
            .receive_events(&[IAC, WILL, 0, IAC, DO, 5, IAC, DONT, 3, IAC, WONT, 0])
            .unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::Will(TelnetOption::TransmitBinary),
                TelnetEvent::Do(TelnetOption::Status),
                TelnetEvent::Dont(TelnetOption::SuppressGoAhead),
                TelnetEvent::Wont(TelnetOption::TransmitBinary),
            ]
        );
        assert!(codec.options().is_empty());
    }

    // ========================================================================
    // Local requests
    // ========================================================================

    #[test]
    fn test_local_requests_follow_q_method() {
        use QState::*;
        let option = TelnetOption::Echo;
        let cases = [
            (TelnetVerb::Will, No, WantYes, true),
            (TelnetVerb::Will, Yes, Yes, false),
            (TelnetVerb::Will, WantNo, WantNoOpposite, false),
            (TelnetVerb::Will, WantYesOpposite, WantYes, false),
            (TelnetVerb::Will, WantYes, WantYes, false),
            (TelnetVerb::Wont, Yes, WantNo, true),
            (TelnetVerb::Wont, No, No, false),
            (TelnetVerb::Wont, WantYes, WantYesOpposite, false),
            (TelnetVerb::Wont, WantNoOpposite, WantNo, false),
            (TelnetVerb::Do, No, WantYes, true),
            (TelnetVerb::Do, WantNo, WantNoOpposite, false),
            (TelnetVerb::Dont, Yes, WantNo, true),
            (TelnetVerb::Dont, WantYes, WantYesOpposite, false),
        ];
        for (verb, before, after, sends) in cases {
            let side = match verb {
                TelnetVerb::Will | TelnetVerb::Wont => TelnetSide::Local,
                _ => TelnetSide::Remote,
            };
            let mut codec = supporting(option);
            codec.set_qstate(option, side, before);
            let mut events = Vec::new();
            codec.negotiate(verb, option, &mut events);
            assert_eq!(codec.qstate(option, side), after, "{verb} from {before}");
            let expected = if sends {
                vec![sent(&[IAC, verb.to_u8(), option.to_u8()])]
            } else {
                vec![]
            };
            assert_eq!(events, expected, "{verb} from {before}");
        }
    }

    #[test]
    fn test_will_when_already_yes_is_silent() {
        let mut codec = supporting(TelnetOption::SuppressGoAhead);
        codec.receive_events(&[IAC, DO, 3]).unwrap();
        assert!(codec.local_enabled(TelnetOption::SuppressGoAhead));
        let mut events = Vec::new();
        codec.negotiate(TelnetVerb::Will, TelnetOption::SuppressGoAhead, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_binary_toggles_derived_flags() {
        let mut codec = supporting(TelnetOption::TransmitBinary);
        codec.receive_events(&[IAC, DO, 0, IAC, WILL, 0]).unwrap();
        assert!(codec.transmit_binary());
        assert!(codec.receive_binary());
        codec.receive_events(&[IAC, DONT, 0]).unwrap();
        assert!(!codec.transmit_binary());
        assert!(codec.receive_binary());
    }

    // ========================================================================
    // Subnegotiation
    // ========================================================================

    #[test]
    fn test_ttype_send() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[IAC, SB, 24, 1, IAC, SE])
            .unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::Subnegotiation {
                    option: TelnetOption::TTYPE,
                    payload: Bytes::from_static(&[1]),
                },
                TelnetEvent::TerminalType {
                    command: TerminalTypeCommand::Send,
                    name: None,
                },
            ]
        );
    }

    #[test]
    fn test_new_environ_is() {
        let mut input = vec![IAC, SB, 39, 0, 0];
        input.extend_from_slice(b"USER");
        input.push(1);
        input.extend_from_slice(b"bob");
        input.extend_from_slice(&[IAC, SE]);
        let mut codec = TelnetCodec::new();
        let events = codec.receive_events(&input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            TelnetEvent::Environ {
                option: TelnetOption::NewEnvironment,
                command: EnvironCommand::Is,
                values: vec![EnvironVar::new(EnvironVarKind::Var, "USER", "bob")],
            }
        );
    }

    #[test]
    fn test_malformed_environ_reports_error() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[IAC, SB, 39, 0, b'U', IAC, SE, b'z'])
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[1],
            TelnetEvent::Error(CodecError::SubnegotiationError {
                reason: SubnegotiationErrorKind::MissingVariableType,
                ..
            })
        ));
        assert_eq!(events[2], TelnetEvent::data(b"z"));
    }

    #[test]
    fn test_escaped_iac_in_subnegotiation() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[IAC, SB, 31, 0, IAC, IAC, 0, 24, IAC, SE])
            .unwrap();
        assert_eq!(
            events,
            vec![TelnetEvent::Subnegotiation {
                option: TelnetOption::NAWS,
                payload: Bytes::from_static(&[0, 0xFF, 0, 24]),
            }]
        );
    }

    #[test]
    fn test_unexpected_byte_after_iac_in_subnegotiation() {
        let mut codec = TelnetCodec::new();
        let events = codec
            .receive_events(&[IAC, SB, 31, 7, IAC, consts::NOP, b'k'])
            .unwrap();
        assert_eq!(
            events,
            vec![
                TelnetEvent::Warning(CodecError::UnexpectedByteInSubnegotiation(consts::NOP)),
                TelnetEvent::Subnegotiation {
                    option: TelnetOption::NAWS,
                    payload: Bytes::from_static(&[7]),
                },
                TelnetEvent::Command(consts::NOP),
                TelnetEvent::data(b"k"),
            ]
        );
    }

    #[test]
    fn test_unexpected_will_after_iac_in_subnegotiation() {
        let mut codec = supporting(TelnetOption::Echo);
        let events = codec
            .receive_events(&[IAC, SB, 31, IAC, WILL, 1])
            .unwrap();
        assert!(matches!(events[0], TelnetEvent::Warning(_)));
        assert!(codec.remote_enabled(TelnetOption::Echo));
    }

    #[test]
    fn test_overflow_discards_only_that_subnegotiation() {
        let mut input = vec![IAC, SB, 31];
        input.extend(std::iter::repeat_n(b'x', SUBNEGOTIATION_LIMIT + 1));
        input.extend_from_slice(b"after");
        let mut codec = TelnetCodec::new();
        let events = codec.receive_events(&input).unwrap();
        assert!(matches!(
            events[0],
            TelnetEvent::Warning(CodecError::SubnegotiationOverflow { .. })
        ));
        assert_eq!(data(&events), b"after".to_vec());
        assert_eq!(codec.parser_state(), ParserState::Data);
    }

    // ========================================================================
    // Send
    // ========================================================================

    #[test]
    fn test_send_doubles_iac() {
        let mut codec = TelnetCodec::new();
        let mut events = Vec::new();
        codec.send(&[1, 0xFF, 2], &mut events);
        assert_eq!(wire(&events), vec![1, 0xFF, 0xFF, 2]);
    }

    #[test]
    fn test_send_text_nvt_translation() {
        let mut codec = TelnetCodec::new();
        let mut events = Vec::new();
        codec.send_text(b"a\rb\nc", &mut events);
        assert_eq!(wire(&events), b"a\r\0b\r\nc".to_vec());
    }

    #[test]
    fn test_send_text_binary_is_untranslated() {
        let mut codec = supporting(TelnetOption::TransmitBinary);
        codec.receive_events(&[IAC, DO, 0]).unwrap();
        let mut events = Vec::new();
        codec.send_text(b"a\rb\n", &mut events);
        assert_eq!(wire(&events), b"a\rb\n".to_vec());
    }

    #[test]
    fn test_send_fmt_always_translates() {
        let mut codec = TelnetCodec::new();
        let mut events = Vec::new();
        let written = codec.send_fmt(format_args!("line {}\n", 3), &mut events);
        assert_eq!(written, 7);
        assert_eq!(wire(&events), b"line 3\r\n".to_vec());
    }

    #[test]
    fn test_subnegotiation_framing() {
        let mut codec = TelnetCodec::new();
        let mut events = Vec::new();
        codec.ttype_is("VT100", &mut events);
        codec.ttype_send(&mut events);
        let mut expected = vec![IAC, SB, 24, 0];
        expected.extend_from_slice(b"VT100");
        expected.extend_from_slice(&[IAC, SE, IAC, SB, 24, 1, IAC, SE]);
        assert_eq!(wire(&events), expected);
    }

    // ========================================================================
    // Decoder / Encoder
    // ========================================================================

    #[test]
    fn test_decoder_yields_replies_as_send_events() {
        let mut codec = supporting(TelnetOption::SuppressGoAhead);
        let mut src = BytesMut::from(&[b'h', b'i', IAC, DO, 3][..]);
        let mut events = Vec::new();
        while let Some(event) = codec.decode(&mut src).unwrap() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                TelnetEvent::data(b"hi"),
                sent(&[IAC, WILL, 3]),
                TelnetEvent::Do(TelnetOption::SuppressGoAhead),
            ]
        );
        assert!(src.is_empty());
    }

    #[test]
    fn test_encoder_frames() {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(TelnetFrame::Data(Bytes::from_static(&[0xFF])), &mut dst)
            .unwrap();
        codec
            .encode(
                TelnetFrame::Negotiate(TelnetVerb::Do, TelnetOption::NAWS),
                &mut dst,
            )
            .unwrap();
        codec.encode(TelnetFrame::Command(consts::GA), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0xFF, 0xFF, IAC, DO, 31, IAC, consts::GA]);
    }
}
