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

//! Subnegotiation payload parsers and the tiered payload buffer

use crate::result::{CodecError, CodecResult};

/// ENVIRON / NEW-ENVIRON variable lists
pub mod environ;
/// TERMINAL-TYPE requests and replies
pub mod ttype;

/// Capacity tiers a subnegotiation payload may grow through.
pub const SUBNEGOTIATION_TIERS: [usize; 5] = [0, 512, 2048, 8192, 16384];

/// Largest subnegotiation payload accepted before it is discarded.
pub const SUBNEGOTIATION_LIMIT: usize = SUBNEGOTIATION_TIERS[SUBNEGOTIATION_TIERS.len() - 1];

/// Outcome of pushing one byte into a [`SubnegotiationBuffer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Buffered {
    /// Byte stored
    Stored,
    /// Top tier is full; byte dropped
    Overflow,
}

///
/// Payload accumulator for `IAC SB ... IAC SE`.
///
/// Grows through [`SUBNEGOTIATION_TIERS`] and refuses to grow past the last
/// tier. Growth uses `try_reserve_exact`, so an allocation failure is reported
/// as [`CodecError::AllocationFailed`] instead of aborting.
///
#[derive(Clone, Debug, Default)]
pub struct SubnegotiationBuffer {
    data: Vec<u8>,
    tier: usize,
}

impl SubnegotiationBuffer {
    /// Empty buffer at the zero tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tier capacity.
    pub fn capacity(&self) -> usize {
        SUBNEGOTIATION_TIERS[self.tier]
    }

    /// Buffered payload.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when no payload is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard the payload, keeping the allocation for the next subnegotiation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn push(&mut self, byte: u8) -> CodecResult<Buffered> {
        if self.data.len() >= self.capacity() {
            if self.tier + 1 >= SUBNEGOTIATION_TIERS.len() {
                return Ok(Buffered::Overflow);
            }
            let next = SUBNEGOTIATION_TIERS[self.tier + 1];
            self.data
                .try_reserve_exact(next - self.data.len())
                .map_err(|_| CodecError::AllocationFailed { requested: next })?;
            self.tier += 1;
        }
        self.data.push(byte);
        Ok(Buffered::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_starts_at_zero_tier() {
        let buffer = SubnegotiationBuffer::new();
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_grows_through_tiers() {
        let mut buffer = SubnegotiationBuffer::new();
        assert_eq!(buffer.push(1).unwrap(), Buffered::Stored);
        assert_eq!(buffer.capacity(), 512);
        for _ in 1..513 {
            buffer.push(0).unwrap();
        }
        assert_eq!(buffer.capacity(), 2048);
        assert_eq!(buffer.len(), 513);
    }

    #[test]
    fn test_buffer_overflows_past_last_tier() {
        let mut buffer = SubnegotiationBuffer::new();
        for _ in 0..SUBNEGOTIATION_LIMIT {
            assert_eq!(buffer.push(b'x').unwrap(), Buffered::Stored);
        }
        assert_eq!(buffer.push(b'x').unwrap(), Buffered::Overflow);
        assert_eq!(buffer.len(), SUBNEGOTIATION_LIMIT);
    }

    #[test]
    fn test_clear_keeps_tier() {
        let mut buffer = SubnegotiationBuffer::new();
        buffer.push(1).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 512);
    }
}
