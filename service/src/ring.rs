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

//! Fixed capacity circular byte buffer
//!
//! Ordinary writes may only fill `capacity - guard` bytes. The guard region is
//! kept free for output the multiplexer itself must inject (Telnet replies,
//! connection notices) through [`RingBuffer::write_reserved`].

use crate::{MuxError, Result};

/// Fixed capacity circular byte buffer with a reserved guard region.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    head: usize,
    len: usize,
    guard: usize,
}

impl RingBuffer {
    /// Allocate a buffer of `capacity` bytes, `guard` of which are reserved.
    pub fn with_capacity(capacity: usize, guard: usize) -> Result<Self> {
        if guard >= capacity {
            return Err(MuxError::invalid(format!(
                "ring buffer of {capacity} bytes cannot reserve {guard}"
            )));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| MuxError::AllocationFailed {
                requested: capacity,
            })?;
        data.resize(capacity, 0);
        Ok(Self {
            data,
            head: 0,
            len: 0,
            guard,
        })
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Size of the reserved region.
    pub fn guard(&self) -> usize {
        self.guard
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Room left for ordinary writes.
    pub fn free(&self) -> usize {
        self.capacity().saturating_sub(self.guard + self.len)
    }

    /// Room left counting the guard region.
    pub fn reserved_free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append all of `bytes` or nothing.
    ///
    /// Returns [`MuxError::Stall`] without touching the buffer when `bytes`
    /// does not fit outside the guard region.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.free() {
            return Err(MuxError::Stall);
        }
        self.copy_in(bytes);
        Ok(())
    }

    /// Append all of `bytes` or nothing, allowed to use the guard region.
    pub fn write_reserved(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.reserved_free() {
            return Err(MuxError::Stall);
        }
        self.copy_in(bytes);
        Ok(())
    }

    /// Append one byte, discarding the oldest when full.
    ///
    /// Returns `true` when a byte was discarded.
    pub fn push_overwrite(&mut self, byte: u8) -> bool {
        if self.len == self.capacity() {
            self.data[self.head] = byte;
            self.head = (self.head + 1) % self.capacity();
            true
        } else {
            self.copy_in(&[byte]);
            false
        }
    }

    /// Insert `bytes` ahead of everything queued.
    pub fn prepend(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.reserved_free() {
            return Err(MuxError::Stall);
        }
        let capacity = self.capacity();
        self.head = (self.head + capacity - bytes.len() % capacity) % capacity;
        self.len += bytes.len();
        self.copy_at(self.head, bytes);
        Ok(())
    }

    /// Queued bytes as two slices, oldest first.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let end = self.head + self.len;
        if end <= self.capacity() {
            (&self.data[self.head..end], &[])
        } else {
            (
                &self.data[self.head..],
                &self.data[..end - self.capacity()],
            )
        }
    }

    /// Queued bytes copied out, oldest first.
    pub fn to_vec(&self) -> Vec<u8> {
        let (first, second) = self.as_slices();
        let mut bytes = Vec::with_capacity(self.len);
        bytes.extend_from_slice(first);
        bytes.extend_from_slice(second);
        bytes
    }

    /// Byte at `index` from the oldest.
    pub fn peek(&self, index: usize) -> Option<u8> {
        (index < self.len).then(|| self.data[(self.head + index) % self.capacity()])
    }

    /// Drop up to `count` of the oldest bytes.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len);
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
        if self.len == 0 {
            self.head = 0;
        }
    }

    /// Remove and return the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.consume(1);
        Some(byte)
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn copy_in(&mut self, bytes: &[u8]) {
        let tail = (self.head + self.len) % self.capacity();
        self.len += bytes.len();
        self.copy_at(tail, bytes);
    }

    fn copy_at(&mut self, start: usize, bytes: &[u8]) {
        let first = bytes.len().min(self.capacity() - start);
        self.data[start..start + first].copy_from_slice(&bytes[..first]);
        self.data[..bytes.len() - first].copy_from_slice(&bytes[first..]);
    }
}
