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

//! Length-prefixed packet framing over a line's byte stream
//!
//! Stream lines carry each packet as a 2-byte big-endian length followed by
//! the payload. Datagram lines already preserve boundaries, so no prefix is
//! written and on receive the length is synthesized from what is buffered.

use crate::{MuxError, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;

/// Bytes in the stream length prefix.
pub const PACKET_HEADER_LEN: usize = 2;

/// Packet reassembly and transmit state for one line.
#[derive(Clone, Debug, Default)]
pub struct PacketFramer {
    datagram: bool,
    rx: Vec<u8>,
    tx: Vec<u8>,
    tx_offset: usize,
    rx_packets: u64,
    tx_packets: u64,
}

impl PacketFramer {
    /// Framer for a stream (`datagram == false`) or datagram line.
    pub fn new(datagram: bool) -> Self {
        Self {
            datagram,
            ..Self::default()
        }
    }

    /// Wire form of one packet.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.datagram {
            return Ok(payload.to_vec());
        }
        let length = u16::try_from(payload.len()).map_err(|_| {
            MuxError::invalid(format!("packet of {} bytes is too large", payload.len()))
        })?;
        let mut frame = Vec::with_capacity(PACKET_HEADER_LEN + payload.len());
        frame.write_u16::<BigEndian>(length)?;
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Queue a packet for transmission.
    ///
    /// Returns [`MuxError::Stall`] while the previous packet has not been
    /// fully handed to the line.
    pub fn begin_send(&mut self, payload: &[u8]) -> Result<()> {
        if self.is_sending() {
            return Err(MuxError::Stall);
        }
        self.tx = self.encode(payload)?;
        self.tx_offset = 0;
        self.tx_packets += 1;
        Ok(())
    }

    /// `true` while part of a packet is still waiting to go out.
    pub fn is_sending(&self) -> bool {
        self.tx_offset < self.tx.len()
    }

    /// The not yet transmitted part of the current packet.
    pub fn pending(&self) -> &[u8] {
        &self.tx[self.tx_offset..]
    }

    /// Mark `count` pending bytes as handed to the line.
    pub fn advance(&mut self, count: usize) {
        self.tx_offset = (self.tx_offset + count).min(self.tx.len());
    }

    /// Feed one received byte.
    ///
    /// `remaining` is how many received bytes follow this one; datagram lines
    /// use it to synthesize the packet length. Returns the payload once a
    /// whole packet has arrived.
    pub fn push(&mut self, byte: u8, remaining: usize) -> Option<Bytes> {
        if self.datagram && self.rx.is_empty() {
            let length = u16::try_from(1 + remaining).unwrap_or(u16::MAX);
            let mut header = [0u8; PACKET_HEADER_LEN];
            BigEndian::write_u16(&mut header, length);
            self.rx.extend_from_slice(&header);
        }
        self.rx.push(byte);
        if self.rx.len() >= PACKET_HEADER_LEN {
            let length = usize::from(BigEndian::read_u16(&self.rx[..PACKET_HEADER_LEN]));
            if length == self.rx.len() - PACKET_HEADER_LEN {
                let packet = Bytes::copy_from_slice(&self.rx[PACKET_HEADER_LEN..]);
                self.rx.clear();
                self.rx_packets += 1;
                return Some(packet);
            }
        }
        None
    }

    /// Packets fully received.
    pub fn rx_packets(&self) -> u64 {
        self.rx_packets
    }

    /// Packets accepted for transmission.
    pub fn tx_packets(&self) -> u64 {
        self.tx_packets
    }

    /// Drop any partial packet in either direction.
    pub fn reset(&mut self) {
        self.reset_receive();
        self.tx.clear();
        self.tx_offset = 0;
    }

    /// Drop a partially received packet.
    pub fn reset_receive(&mut self) {
        self.rx.clear();
    }
}
