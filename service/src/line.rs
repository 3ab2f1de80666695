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

//! State of one multiplexer line
//!
//! A line owns its receive and transmit rings, its Telnet scanner, modem
//! signals and whichever sockets it currently holds. Everything here works
//! on the line alone; decisions involving other lines live in the
//! multiplexer.

use crate::config::{GUARD, LineSettings, UNBUFFERED_SIZE};
use crate::modem::{LinkSignals, ModemControl};
use crate::packet::PacketFramer;
use crate::ring::RingBuffer;
use crate::transport::{Connection, LoopbackBuffer, Outbound};
use crate::types::{LineInfo, LineState, LineStats, RxChar};
use crate::{MuxError, Result};
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use telmux_telnetcodec::{
    ParserState, TelnetCodec, TelnetEvent, TelnetFlags, TelnetOption, TelnetVerb, consts,
};
use tracing::{debug, trace, warn};

/// Options we offer the moment a Telnet peer connects:
/// WILL LINEMODE, WILL SGA, WILL ECHO, WILL BINARY, DO BINARY.
pub(crate) const MANTRA: [u8; GUARD] = [
    consts::IAC,
    consts::WILL,
    consts::option::LINEMODE,
    consts::IAC,
    consts::WILL,
    consts::option::SGA,
    consts::IAC,
    consts::WILL,
    consts::option::ECHO,
    consts::IAC,
    consts::WILL,
    consts::option::BINARY,
    consts::IAC,
    consts::DO,
    consts::option::BINARY,
];

/// Options a line refuses once per connection when the peer raises them.
pub(crate) fn is_refused_option(code: u8) -> bool {
    use consts::option::*;
    matches!(
        code,
        STATUS
            | TM
            | NAOCRD..=NAOLFD
            | XASCII
            | LOGOUT
            | BM
            | DET
            | SNDLOC
            | TTYPE
            | EOR
            | TUID
            | OUTMRK
            | TTYLOC
            | REGIME_3270
            | X3PAD
            | NAWS
            | TSPEED
            | LFLOW
            | XDISPLOC
            | ENVIRON
            | AUTHENTICATION
            | ENCRYPT
            | NEW_ENVIRON
            | TN3270E
            | CHARSET
            | COMPORT
            | KERMIT
    )
}

#[derive(Debug)]
pub(crate) struct Line {
    pub(crate) index: usize,
    pub(crate) settings: LineSettings,
    pub(crate) rx: RingBuffer,
    /// Sequence numbers of received break characters
    breaks: VecDeque<u64>,
    rx_in: u64,
    rx_out: u64,
    pub(crate) tx: RingBuffer,
    codec: TelnetCodec,
    refused_remote: HashSet<u8>,
    refused_local: HashSet<u8>,
    /// Drop an LF or NUL following CR
    strip_pad: bool,
    after_cr: bool,
    pub(crate) modem: ModemControl,
    pub(crate) stats: LineStats,
    pub(crate) framer: PacketFramer,
    pub(crate) xmte: bool,
    pub(crate) conn: bool,
    pub(crate) connect_pending: bool,
    pub(crate) connection: Option<Connection>,
    pub(crate) connecting: Option<Outbound>,
    pub(crate) connect_started: Option<Duration>,
    pub(crate) listener: Option<TcpListener>,
    pub(crate) loopback: Option<LoopbackBuffer>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) connected_at: Option<Duration>,
    log: Option<File>,
}

impl Line {
    pub(crate) fn new(index: usize, settings: LineSettings) -> Result<Self> {
        let rx = RingBuffer::with_capacity(UNBUFFERED_SIZE, GUARD)?;
        let tx = RingBuffer::with_capacity(settings.buffering.size(), GUARD)?;
        let loopback = if settings.loopback {
            Some(LoopbackBuffer::new(rx.capacity(), settings.datagram)?)
        } else {
            None
        };
        Ok(Self {
            index,
            rx,
            breaks: VecDeque::new(),
            rx_in: 0,
            rx_out: 0,
            tx,
            codec: TelnetCodec::with_support(&[], TelnetFlags::default().with_proxy(true)),
            refused_remote: HashSet::new(),
            refused_local: HashSet::new(),
            strip_pad: false,
            after_cr: false,
            modem: ModemControl::default(),
            stats: LineStats::default(),
            framer: PacketFramer::new(settings.datagram),
            xmte: true,
            conn: false,
            connect_pending: settings.loopback,
            connection: None,
            connecting: None,
            connect_started: None,
            listener: None,
            loopback,
            peer: None,
            connected_at: None,
            log: None,
            settings,
        })
    }

    pub(crate) fn telnet(&self) -> bool {
        self.settings.telnet
    }

    /// Buffered Telnet lines keep output while disconnected and overwrite
    /// the oldest byte when full.
    pub(crate) fn keeps_output(&self) -> bool {
        self.settings.buffering.is_buffered() && self.settings.telnet
    }

    pub(crate) fn open_log(&mut self) -> Result<()> {
        if let Some(path) = &self.settings.log {
            let file = File::options().create(true).append(true).open(path)?;
            self.log = Some(file);
        }
        Ok(())
    }

    /// Return the line to its idle state without touching the connection.
    pub(crate) fn init(&mut self) {
        self.codec.reset();
        self.xmte = true;
        self.strip_pad = false;
        self.after_cr = false;
        self.rx.clear();
        self.breaks.clear();
        self.rx_out = self.rx_in;
        self.framer.reset_receive();
        if let Some(loopback) = &mut self.loopback {
            loopback.clear();
        }
        if !self.keeps_output() {
            self.tx.clear();
            self.framer.reset();
        }
        if let Some(log) = &mut self.log {
            if let Err(e) = log.flush() {
                warn!(line = self.index, error = %e, "transmit log flush failed");
            }
        }
    }

    /// Forget which options were refused on the previous connection.
    pub(crate) fn reset_refusals(&mut self) {
        self.refused_remote.clear();
        self.refused_local.clear();
    }

    pub(crate) fn state(&self) -> LineState {
        if self.conn {
            LineState::Connected
        } else if self.modem.ringing() {
            LineState::Ringing
        } else if self.connecting.is_some() {
            LineState::Connecting
        } else if self.listener.is_some() {
            LineState::Listening
        } else {
            LineState::Idle
        }
    }

    /// Recompute the incoming modem signals.
    pub(crate) fn refresh_modem(&mut self, shared_listener: bool) {
        let link = if self.connection.is_some() || self.loopback.is_some() {
            LinkSignals::Connected {
                half_duplex: self.settings.half_duplex,
            }
        } else {
            LinkSignals::Idle {
                reachable: self.listener.is_some()
                    || shared_listener
                    || (self.settings.port.is_some() && self.settings.destination.is_some()),
            }
        };
        self.modem.refresh(link);
    }

    /// Eligible for a caller arriving on the shared listener.
    pub(crate) fn accepts_shared(&self) -> bool {
        !self.conn
            && self.settings.destination.is_none()
            && self.settings.port.is_none()
            && !self.settings.loopback
            && !self.connect_pending
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// How many bytes the next socket read may take.
    pub(crate) fn read_limit(&self) -> usize {
        if self.rx.is_empty() || (self.telnet() && self.codec.parser_state() != ParserState::Data) {
            self.rx.free()
        } else {
            0
        }
    }

    /// Read from whatever peer the line has.
    pub(crate) fn read_peer(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(loopback) = &mut self.loopback {
            return loopback.read(buf);
        }
        match &mut self.connection {
            Some(connection) => Ok(connection.read(buf)?),
            None => Ok(0),
        }
    }

    /// Strip Telnet framing from freshly read bytes and queue the rest.
    pub(crate) fn receive(&mut self, raw: &[u8]) -> Result<()> {
        self.stats.rx_bytes += raw.len() as u64;
        if !self.telnet() {
            for &byte in raw {
                self.push_rx(byte, false);
            }
            return Ok(());
        }

        let mut events = Vec::new();
        self.codec.receive(raw, &mut events)?;
        let mut replies = Vec::new();
        for event in events {
            match event {
                TelnetEvent::Data(bytes) => self.receive_data(&bytes),
                TelnetEvent::Command(consts::BRK) => {
                    self.after_cr = false;
                    self.push_rx(0, true);
                }
                TelnetEvent::Will(option) => {
                    if is_refused_option(option.to_u8())
                        && self.refused_remote.insert(option.to_u8())
                    {
                        self.codec.negotiate(TelnetVerb::Dont, option, &mut replies);
                    }
                    if option == TelnetOption::TransmitBinary {
                        self.strip_pad = false;
                    }
                }
                TelnetEvent::Wont(TelnetOption::TransmitBinary) => self.strip_pad = true,
                TelnetEvent::Do(option) => {
                    if is_refused_option(option.to_u8())
                        && self.refused_local.insert(option.to_u8())
                    {
                        self.codec.negotiate(TelnetVerb::Wont, option, &mut replies);
                    }
                }
                TelnetEvent::Warning(error) | TelnetEvent::Error(error) => {
                    debug!(line = self.index, %error, "telnet framing problem");
                }
                other => trace!(line = self.index, event = ?other, "ignored"),
            }
        }
        for reply in replies {
            if let TelnetEvent::Send(wire) = reply {
                if self.tx.write_reserved(&wire).is_err() {
                    warn!(line = self.index, "no room to refuse telnet option");
                }
            }
        }
        Ok(())
    }

    fn receive_data(&mut self, bytes: &Bytes) {
        for &byte in bytes.iter() {
            if self.after_cr {
                self.after_cr = false;
                if byte == consts::LF || byte == consts::NUL {
                    continue;
                }
            }
            if byte == consts::CR && self.strip_pad {
                self.after_cr = true;
            }
            self.push_rx(byte, false);
        }
    }

    fn push_rx(&mut self, byte: u8, brk: bool) {
        if self.rx.write_reserved(&[byte]).is_err() {
            self.drop_bytes(1);
            return;
        }
        if brk {
            self.breaks.push_back(self.rx_in);
        }
        self.rx_in += 1;
    }

    /// Next received character.
    pub(crate) fn getc(&mut self) -> Option<RxChar> {
        let byte = self.rx.pop()?;
        let sequence = self.rx_out;
        self.rx_out += 1;
        if self.breaks.front() == Some(&sequence) {
            self.breaks.pop_front();
            return Some(RxChar::brk());
        }
        Some(RxChar::data(byte))
    }

    /// Next complete received packet.
    pub(crate) fn get_packet(&mut self) -> Option<Bytes> {
        while let Some(ch) = self.getc() {
            if let Some(packet) = self.framer.push(ch.byte, self.rx.len()) {
                self.stats.rx_packets = self.framer.rx_packets();
                return Some(packet);
            }
        }
        None
    }

    // ========================================================================
    // Transmit
    // ========================================================================

    pub(crate) fn drop_bytes(&mut self, count: u64) {
        self.stats.dropped += count;
        metrics::counter!("telmux.bytes.dropped").increment(count);
    }

    /// Queue one character for transmission.
    pub(crate) fn putc(&mut self, byte: u8) -> Result<()> {
        if !self.conn && !self.keeps_output() {
            self.drop_bytes(1);
            return Err(MuxError::Lost);
        }
        let escaped: &[u8] = if self.telnet() && byte == consts::IAC {
            &[consts::IAC, consts::IAC]
        } else {
            std::slice::from_ref(&byte)
        };
        if self.keeps_output() {
            for &wire in escaped {
                if self.tx.push_overwrite(wire) {
                    self.drop_bytes(1);
                }
            }
        } else if self.tx.write(escaped).is_err() {
            self.drop_bytes(1);
            self.xmte = false;
            return Err(MuxError::Stall);
        }
        self.stats.tx_bytes += 1;
        self.log_byte(byte);
        if self.tx.free() == 0 {
            self.xmte = false;
        }
        Ok(())
    }

    fn log_byte(&mut self, byte: u8) {
        if let Some(log) = &mut self.log {
            if let Err(e) = log.write_all(&[byte]) {
                warn!(line = self.index, error = %e, "transmit log disabled");
                self.log = None;
            }
        }
    }

    /// Move as much of the pending packet into the transmit ring as fits.
    pub(crate) fn refill_packet(&mut self) -> usize {
        let mut moved = 0;
        while self.framer.is_sending() {
            let byte = self.framer.pending()[0];
            if self.putc(byte).is_err() {
                break;
            }
            self.framer.advance(1);
            moved += 1;
        }
        moved
    }

    /// Write queued output to the peer.
    ///
    /// Returns the bytes still queued. A failed write is returned as the
    /// error; the caller closes the line.
    pub(crate) fn send_buffered(&mut self) -> io::Result<usize> {
        loop {
            if !self.tx.is_empty() {
                let written = {
                    let (first, second) = self.tx.as_slices();
                    let (loopback, connection) = (&mut self.loopback, &mut self.connection);
                    let mut written = Self::write_peer(loopback, connection, first)?;
                    if written == first.len() && !second.is_empty() {
                        written += Self::write_peer(loopback, connection, second)?;
                    }
                    written
                };
                self.tx.consume(written);
                self.stats.tx_sent += written as u64;
                metrics::counter!("telmux.bytes.sent").increment(written as u64);
            }
            if self.tx.is_empty() && self.framer.is_sending() && self.refill_packet() > 0 {
                continue;
            }
            return Ok(self.tx.len());
        }
    }

    fn write_peer(
        loopback: &mut Option<LoopbackBuffer>,
        connection: &mut Option<Connection>,
        buf: &[u8],
    ) -> io::Result<usize> {
        if let Some(loopback) = loopback {
            return Ok(loopback.write(buf));
        }
        match connection {
            Some(connection) => connection.write(buf),
            None => Ok(0),
        }
    }

    /// Close an outbound attempt that has not completed.
    pub(crate) fn abandon_connect(&mut self) {
        if let Some(outbound) = self.connecting.take() {
            outbound.close();
        }
        self.connect_started = None;
    }

    /// Drop queued output and any packet in progress.
    pub(crate) fn discard_output(&mut self) {
        self.tx.clear();
        self.framer.reset();
    }

    pub(crate) fn info(&self, now: Duration) -> LineInfo {
        LineInfo {
            line: self.index,
            state: self.state(),
            peer: self.peer,
            destination: self.settings.destination.clone(),
            modem: self.modem.bits(),
            telnet: self.settings.telnet,
            buffered: self
                .settings
                .buffering
                .is_buffered()
                .then(|| self.settings.buffering.size()),
            datagram: self.settings.datagram,
            packet: self.settings.packet,
            loopback: self.loopback.is_some(),
            speed: self.settings.speed,
            rx_pending: self.rx.len(),
            tx_pending: self.tx.len(),
            connected_for: self.connected_at.map(|at| now.saturating_sub(at)),
            stats: LineStats {
                rx_packets: self.framer.rx_packets(),
                tx_packets: self.framer.tx_packets(),
                ..self.stats
            },
        }
    }
}
