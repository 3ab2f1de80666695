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

//! Core types for the line multiplexer

use crate::config::Speed;
use crate::modem::ModemBits;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Where a line is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Nothing attached and nothing pending
    Idle,
    /// An incoming call is waiting for the device to raise DTR
    Ringing,
    /// A per-line listener is waiting for a caller
    Listening,
    /// An outbound connection is in progress
    Connecting,
    /// A peer or loopback is attached
    Connected,
}

impl LineState {
    /// Check if a peer is attached
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ringing => write!(f, "ringing"),
            Self::Listening => write!(f, "listening"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// One received character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxChar {
    /// Character value
    pub byte: u8,
    /// The peer sent a break; `byte` is NUL
    pub brk: bool,
}

impl RxChar {
    /// Ordinary character
    pub fn data(byte: u8) -> Self {
        Self { byte, brk: false }
    }

    /// Break condition
    pub fn brk() -> Self {
        Self { byte: 0, brk: true }
    }
}

/// Traffic counters of one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    /// Bytes read from the peer
    pub rx_bytes: u64,
    /// Bytes accepted from the device for transmission
    pub tx_bytes: u64,
    /// Bytes written to the peer
    pub tx_sent: u64,
    /// Bytes lost to a full or unconnected line
    pub dropped: u64,
    /// Packets received
    pub rx_packets: u64,
    /// Packets transmitted
    pub tx_packets: u64,
}

/// Line information snapshot
#[derive(Debug, Clone)]
pub struct LineInfo {
    /// Line number
    pub line: usize,
    /// Current state
    pub state: LineState,
    /// Peer address
    pub peer: Option<SocketAddr>,
    /// Outbound destination
    pub destination: Option<String>,
    /// Modem control signals
    pub modem: ModemBits,
    /// Telnet framing is active
    pub telnet: bool,
    /// Transmit buffer size when buffered
    pub buffered: Option<usize>,
    /// Datagram transport
    pub datagram: bool,
    /// Packet framing
    pub packet: bool,
    /// Loopback
    pub loopback: bool,
    /// Configured speed
    pub speed: Option<Speed>,
    /// Received characters waiting for the device
    pub rx_pending: usize,
    /// Bytes waiting to be written to the peer
    pub tx_pending: usize,
    /// How long the current connection has been up
    pub connected_for: Option<Duration>,
    /// Traffic counters
    pub stats: LineStats,
}

impl fmt::Display for LineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.state)?;
        if let Some(peer) = self.peer {
            write!(f, " to {peer}")?;
        }
        if let Some(duration) = self.connected_for {
            write!(f, " for {}s", duration.as_secs())?;
        }
        write!(
            f,
            ", modem {}, rx {} tx {} dropped {}",
            self.modem, self.stats.rx_bytes, self.stats.tx_bytes, self.stats.dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_state_display() {
        assert_eq!(LineState::Ringing.to_string(), "ringing");
        assert!(LineState::Connected.is_connected());
        assert!(!LineState::Listening.is_connected());
    }

    #[test]
    fn test_rx_char_constructors() {
        assert_eq!(RxChar::data(b'a'), RxChar { byte: b'a', brk: false });
        assert_eq!(RxChar::brk(), RxChar { byte: 0, brk: true });
    }

    #[test]
    fn test_line_info_display() {
        let info = LineInfo {
            line: 2,
            state: LineState::Connected,
            peer: Some("127.0.0.1:4000".parse().unwrap()),
            destination: None,
            modem: ModemBits::DTR | ModemBits::DCD,
            telnet: true,
            buffered: None,
            datagram: false,
            packet: false,
            loopback: false,
            speed: None,
            rx_pending: 0,
            tx_pending: 0,
            connected_for: Some(Duration::from_secs(5)),
            stats: LineStats {
                rx_bytes: 10,
                tx_bytes: 20,
                ..LineStats::default()
            },
        };
        assert_eq!(
            info.to_string(),
            "line 2: connected to 127.0.0.1:4000 for 5s, modem DTR|DCD, rx 10 tx 20 dropped 0"
        );
    }
}
