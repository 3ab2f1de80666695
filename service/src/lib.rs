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

//! # Telmux Line Multiplexer
//!
//! Makes emulated serial lines reachable over TCP as if they were wired to a
//! terminal server. Each line has receive and transmit rings, optional Telnet
//! framing, optional packet framing and emulated modem control signals.
//!
//! ## Architecture
//!
//! ```text
//! socket ──► Telnet scanner ──► RX RingBuffer ──► device (getc / get_packet)
//! device (putc / put_packet) ──► TX RingBuffer ──► socket
//! ```
//!
//! Everything runs from the host's own loop. No threads are started and no
//! call waits for the network. An outbound connect that has not completed
//! within [`MuxConfig::connect_timeout`] is abandoned and retried.
//!
//! ## Example
//!
//! ```no_run
//! use telmux_service::{ModemBits, Multiplexer, MuxConfig};
//!
//! # fn main() -> telmux_service::Result<()> {
//! let mut mux = Multiplexer::new(MuxConfig::new("pdp11", 8).with_device_name("DZ"))?;
//! mux.attach("2323,Modem,Line=7,Buffered")?;
//! mux.set_get_modem_bits(0, ModemBits::DTR | ModemBits::RTS, ModemBits::NONE)?;
//!
//! loop {
//!     if let Some(line) = mux.poll_connections()? {
//!         println!("line {line} connected");
//!     }
//!     mux.poll_rx()?;
//!     while let Some(ch) = mux.getc(0)? {
//!         mux.putc(0, ch.byte).ok();
//!     }
//!     mux.poll_tx();
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modem Control
//!
//! With modem control enabled a line only takes callers while the device
//! holds DTR up. A caller arriving while every such line has DTR down is held
//! and RNG is presented on those lines; the first line to raise DTR answers.
//! An unanswered call is refused after [`MuxConfig::ring_timeout`].

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

mod clock;
mod config;
mod error;
mod line;
mod manager;
mod modem;
mod packet;
mod ring;
mod transport;
mod types;

pub use clock::{CheckOrder, Clock, FixedOrder, ManualClock, RandomOrder, SystemClock};
pub use config::{
    AttachSpec, Buffering, DEFAULT_BUFFERED_SIZE, GUARD, LineConfig, MAX_BUFFERED_SIZE, MuxConfig,
    SPEEDS, Speed, UNBUFFERED_SIZE, parse_line_order, parse_speed,
};
pub use error::{MuxError, Result};
pub use manager::Multiplexer;
pub use modem::{LinkSignals, ModemBits, ModemControl};
pub use packet::{PACKET_HEADER_LEN, PacketFramer};
pub use ring::RingBuffer;
pub use types::{LineInfo, LineState, LineStats, RxChar};
