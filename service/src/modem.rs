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

//! Modem control signal emulation
//!
//! The attached device drives DTR and RTS. DCD, RNG, CTS and DSR are derived
//! from the state of the line's network connection.

use crate::{MuxError, Result};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// A set of modem control signals.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ModemBits(u8);

impl ModemBits {
    /// No signals
    pub const NONE: ModemBits = ModemBits(0);
    /// Data Terminal Ready
    pub const DTR: ModemBits = ModemBits(0x01);
    /// Request To Send
    pub const RTS: ModemBits = ModemBits(0x02);
    /// Data Carrier Detect
    pub const DCD: ModemBits = ModemBits(0x04);
    /// Ring Indicator
    pub const RNG: ModemBits = ModemBits(0x08);
    /// Clear To Send
    pub const CTS: ModemBits = ModemBits(0x10);
    /// Data Set Ready
    pub const DSR: ModemBits = ModemBits(0x20);
    /// Signals the device may drive
    pub const OUTGOING: ModemBits = ModemBits(0x01 | 0x02);
    /// Signals derived from the connection
    pub const INCOMING: ModemBits = ModemBits(0x04 | 0x08 | 0x10 | 0x20);

    /// Raw bit value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Set from raw bits, ignoring undefined ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        ModemBits(bits & 0x3F)
    }

    /// `true` when every signal in `other` is present.
    pub const fn contains(self, other: ModemBits) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` when any signal in `other` is present.
    pub const fn intersects(self, other: ModemBits) -> bool {
        self.0 & other.0 != 0
    }

    /// `true` when no signal is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add signals.
    pub fn insert(&mut self, other: ModemBits) {
        self.0 |= other.0;
    }

    /// Remove signals.
    pub fn remove(&mut self, other: ModemBits) {
        self.0 &= !other.0;
    }
}

impl BitOr for ModemBits {
    type Output = ModemBits;

    fn bitor(self, rhs: ModemBits) -> ModemBits {
        ModemBits(self.0 | rhs.0)
    }
}

impl BitOrAssign for ModemBits {
    fn bitor_assign(&mut self, rhs: ModemBits) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ModemBits {
    type Output = ModemBits;

    fn bitand(self, rhs: ModemBits) -> ModemBits {
        ModemBits(self.0 & rhs.0)
    }
}

impl Not for ModemBits {
    type Output = ModemBits;

    fn not(self) -> ModemBits {
        ModemBits(!self.0 & 0x3F)
    }
}

impl fmt::Display for ModemBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ModemBits, &str); 6] = [
            (ModemBits::DTR, "DTR"),
            (ModemBits::RTS, "RTS"),
            (ModemBits::DCD, "DCD"),
            (ModemBits::RNG, "RNG"),
            (ModemBits::CTS, "CTS"),
            (ModemBits::DSR, "DSR"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// What the line's network side looks like when deriving incoming signals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkSignals {
    /// A socket or loopback is attached
    Connected {
        /// DCD follows CTS instead of DSR
        half_duplex: bool,
    },
    /// Nothing attached yet
    Idle {
        /// A listener or outbound destination could produce a connection
        reachable: bool,
    },
}

/// Modem control state of one line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ModemControl {
    bits: ModemBits,
}

impl ModemControl {
    /// Current signals.
    pub fn bits(&self) -> ModemBits {
        self.bits
    }

    /// `true` while DTR is raised.
    pub fn dtr(&self) -> bool {
        self.bits.contains(ModemBits::DTR)
    }

    /// `true` while RNG is presented.
    pub fn ringing(&self) -> bool {
        self.bits.contains(ModemBits::RNG)
    }

    /// Present or withdraw the ring indicator.
    pub fn set_ring(&mut self, ringing: bool) {
        if ringing {
            self.bits.insert(ModemBits::RNG);
        } else {
            self.bits.remove(ModemBits::RNG);
        }
    }

    /// Apply a device request to the outgoing signals.
    ///
    /// Only DTR and RTS may be named, and not in both sets. Returns the
    /// signals as they were before the change.
    pub fn drive(&mut self, set: ModemBits, clear: ModemBits) -> Result<ModemBits> {
        if set.intersects(!ModemBits::OUTGOING)
            || clear.intersects(!ModemBits::OUTGOING)
            || set.intersects(clear)
        {
            return Err(MuxError::invalid(format!(
                "cannot set {set} and clear {clear}"
            )));
        }
        let before = self.bits;
        self.bits.insert(set);
        self.bits.remove(clear);
        Ok(before)
    }

    /// Recompute the incoming signals from the link.
    ///
    /// An idle line keeps RNG while a call is waiting for it.
    pub fn refresh(&mut self, link: LinkSignals) {
        let ringing = self.ringing();
        self.bits.remove(ModemBits::INCOMING);
        let incoming = match link {
            LinkSignals::Connected { half_duplex } => {
                if self.dtr() {
                    let mut incoming = ModemBits::DSR;
                    if self.bits.contains(ModemBits::RTS) {
                        incoming |= ModemBits::CTS;
                    }
                    if !half_duplex || incoming.contains(ModemBits::CTS) {
                        incoming |= ModemBits::DCD;
                    }
                    incoming
                } else {
                    ModemBits::DCD | ModemBits::DSR | ModemBits::RNG
                }
            }
            LinkSignals::Idle { reachable } => {
                let mut incoming = if reachable {
                    ModemBits::DSR
                } else {
                    ModemBits::NONE
                };
                if ringing {
                    incoming |= ModemBits::RNG;
                }
                incoming
            }
        };
        self.bits.insert(incoming);
    }

    /// Drop every signal.
    pub fn clear(&mut self) {
        self.bits = ModemBits::NONE;
    }
}
