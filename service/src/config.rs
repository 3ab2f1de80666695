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

//! Multiplexer and line configuration
//!
//! [`MuxConfig`] holds the multiplexer-wide settings and the defaults every
//! line starts from. [`LineConfig`] holds per-line overrides. Both can be
//! built in code or produced from an attach string by [`AttachSpec::parse`].
//!
//! # Examples
//!
//! ```
//! use telmux_service::{AttachSpec, MuxConfig};
//! use std::time::Duration;
//!
//! let config = MuxConfig::new("pdp11", 4)
//!     .with_device_name("DZ")
//!     .with_modem_control(true)
//!     .with_poll_interval(Duration::from_millis(250));
//!
//! let spec = AttachSpec::parse("2323,Buffered=4096,Line=1,Connect=host:2324;notelnet").unwrap();
//! assert_eq!(spec.defaults.port.as_deref(), Some("2323"));
//! assert_eq!(spec.lines[&1].destination.as_deref(), Some("host:2324"));
//! ```

use crate::{MuxError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Bytes of every line buffer kept free for injected Telnet output.
///
/// Equal to the length of the option mantra sent on connect.
pub const GUARD: usize = 15;

/// Buffer size of an unbuffered line.
pub const UNBUFFERED_SIZE: usize = 256;

/// Buffer size used by `Buffered` without a size.
pub const DEFAULT_BUFFERED_SIZE: usize = 32768;

/// Largest accepted buffer size.
pub const MAX_BUFFERED_SIZE: usize = 1024 * 1024;

/// Line speeds accepted by [`parse_speed`].
pub const SPEEDS: [u32; 20] = [
    50, 75, 110, 134, 150, 300, 600, 1200, 1800, 2000, 2400, 3600, 4800, 7200, 9600, 19200,
    38400, 57600, 76800, 115_200,
];

/// Transmit buffering of a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Buffering {
    /// Small buffer; output stalls when full
    Unbuffered,
    /// Large buffer kept while disconnected; the oldest output is overwritten when full
    Buffered(usize),
}

impl Buffering {
    /// Buffer size in bytes.
    pub fn size(self) -> usize {
        match self {
            Buffering::Unbuffered => UNBUFFERED_SIZE,
            Buffering::Buffered(size) => size,
        }
    }

    /// `true` for [`Buffering::Buffered`].
    pub fn is_buffered(self) -> bool {
        matches!(self, Buffering::Buffered(_))
    }
}

/// A line speed with its rate multiplier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Speed {
    /// Bits per second
    pub bps: u32,
    /// Rate multiplier
    pub factor: f64,
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.factor - 1.0).abs() < f64::EPSILON {
            write!(f, "{}", self.bps)
        } else {
            write!(f, "{}*{}", self.bps, self.factor)
        }
    }
}

/// Parse `bps[*factor]`.
pub fn parse_speed(text: &str) -> Result<Speed> {
    let invalid = || MuxError::InvalidSpeed(text.to_string());
    let (bps, factor) = match text.split_once('*') {
        Some((bps, factor)) => (bps, Some(factor)),
        None => (text, None),
    };
    let bps: u32 = bps.trim().parse().map_err(|_| invalid())?;
    if !SPEEDS.contains(&bps) {
        return Err(invalid());
    }
    let factor = match factor {
        Some(factor) => factor.trim().parse::<f64>().map_err(|_| invalid())?,
        None => 1.0,
    };
    if !factor.is_finite() || factor <= 0.0 {
        return Err(invalid());
    }
    Ok(Speed { bps, factor })
}

/// Parse a connection order such as `"3;0-1"`.
///
/// Lines not named are appended in ascending order. Returns an empty list
/// when the result is plain sequential order.
pub fn parse_line_order(text: &str, lines: usize) -> Result<Vec<usize>> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("all") {
        return Ok(Vec::new());
    }
    let number = |value: &str| -> Result<usize> {
        let line: usize = value
            .trim()
            .parse()
            .map_err(|_| MuxError::invalid(format!("bad line number '{value}'")))?;
        if line >= lines {
            return Err(MuxError::InvalidLine(line));
        }
        Ok(line)
    };

    let mut seen = BTreeSet::new();
    let mut order = Vec::with_capacity(lines);
    for item in text.split(';').filter(|item| !item.trim().is_empty()) {
        let (low, high) = match item.split_once('-') {
            Some((low, high)) => (number(low)?, number(high)?),
            None => {
                let line = number(item)?;
                (line, line)
            }
        };
        if low > high {
            return Err(MuxError::invalid(format!("bad line range '{item}'")));
        }
        for line in low..=high {
            if seen.insert(line) {
                order.push(line);
            }
        }
    }
    order.extend((0..lines).filter(|line| !seen.contains(line)));
    if order.iter().copied().eq(0..lines) {
        order.clear();
    }
    Ok(order)
}

/// Multiplexer-wide configuration and line defaults.
#[derive(Clone, Debug)]
pub struct MuxConfig {
    /// Simulator name used in connection notices
    pub sim_name: String,
    /// Device name used in connection notices
    pub device_name: Option<String>,
    /// Number of lines
    pub lines: usize,
    /// Listen address of the shared listener
    pub port: Option<String>,
    /// Default transmit buffering
    pub buffering: Buffering,
    /// Default Telnet framing
    pub telnet: bool,
    /// Default datagram transport
    pub datagram: bool,
    /// Default packet framing
    pub packet: bool,
    /// Default modem control emulation
    pub modem_control: bool,
    /// Minimum time between connection polls
    pub poll_interval: Duration,
    /// How long an unanswered call may ring
    pub ring_timeout: Duration,
    /// Polled time after which an outbound attempt is abandoned
    pub connect_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            sim_name: "telmux".to_string(),
            device_name: None,
            lines: 1,
            port: None,
            buffering: Buffering::Unbuffered,
            telnet: true,
            datagram: false,
            packet: false,
            modem_control: false,
            poll_interval: Duration::from_secs(1),
            ring_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl MuxConfig {
    /// Configuration for `lines` lines of simulator `sim_name`.
    pub fn new(sim_name: impl Into<String>, lines: usize) -> Self {
        Self {
            sim_name: sim_name.into(),
            lines,
            ..Self::default()
        }
    }

    /// Set the device name
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Set the shared listen address
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the default buffering
    pub fn with_buffering(mut self, buffering: Buffering) -> Self {
        self.buffering = buffering;
        self
    }

    /// Enable or disable Telnet framing by default
    pub fn with_telnet(mut self, telnet: bool) -> Self {
        self.telnet = telnet;
        self
    }

    /// Enable or disable datagram transport by default
    pub fn with_datagram(mut self, datagram: bool) -> Self {
        self.datagram = datagram;
        self
    }

    /// Enable or disable packet framing by default
    pub fn with_packet(mut self, packet: bool) -> Self {
        self.packet = packet;
        self
    }

    /// Enable or disable modem control by default
    pub fn with_modem_control(mut self, modem_control: bool) -> Self {
        self.modem_control = modem_control;
        self
    }

    /// Set the connection poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the ring timeout
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the outbound connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.lines == 0 {
            return Err(MuxError::invalid("a multiplexer needs at least one line"));
        }
        validate_buffering(self.buffering)
    }
}

fn validate_buffering(buffering: Buffering) -> Result<()> {
    match buffering {
        Buffering::Buffered(size) if !(GUARD + 1..=MAX_BUFFERED_SIZE).contains(&size) => Err(
            MuxError::invalid(format!("buffer size {size} outside {}..={MAX_BUFFERED_SIZE}", GUARD + 1)),
        ),
        _ => Ok(()),
    }
}

/// Per-line overrides; unset fields take the [`MuxConfig`] default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineConfig {
    /// Listen address for this line alone
    pub port: Option<String>,
    /// Outbound `host:port` this line connects to
    pub destination: Option<String>,
    /// Telnet framing
    pub telnet: Option<bool>,
    /// Transmit buffering
    pub buffering: Option<Buffering>,
    /// Modem control emulation
    pub modem_control: Option<bool>,
    /// Datagram transport
    pub datagram: Option<bool>,
    /// Packet framing
    pub packet: Option<bool>,
    /// Transmitted data is looped back to the receive side
    pub loopback: bool,
    /// DCD follows CTS
    pub half_duplex: bool,
    /// Line speed
    pub speed: Option<Speed>,
    /// Transmit log file
    pub log: Option<PathBuf>,
}

impl LineConfig {
    /// Set the listen address
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the outbound destination
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Enable or disable Telnet framing
    pub fn with_telnet(mut self, telnet: bool) -> Self {
        self.telnet = Some(telnet);
        self
    }

    /// Set the buffering
    pub fn with_buffering(mut self, buffering: Buffering) -> Self {
        self.buffering = Some(buffering);
        self
    }

    /// Enable or disable modem control
    pub fn with_modem_control(mut self, modem_control: bool) -> Self {
        self.modem_control = Some(modem_control);
        self
    }

    /// Enable or disable datagram transport
    pub fn with_datagram(mut self, datagram: bool) -> Self {
        self.datagram = Some(datagram);
        self
    }

    /// Enable or disable packet framing
    pub fn with_packet(mut self, packet: bool) -> Self {
        self.packet = Some(packet);
        self
    }

    /// Enable or disable loopback
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Enable or disable half duplex
    pub fn with_half_duplex(mut self, half_duplex: bool) -> Self {
        self.half_duplex = half_duplex;
        self
    }

    /// Set the speed
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Overlay the fields set in `other`.
    pub fn merge(&mut self, other: &LineConfig) {
        if other.port.is_some() {
            self.port.clone_from(&other.port);
        }
        if other.destination.is_some() {
            self.destination.clone_from(&other.destination);
        }
        if other.log.is_some() {
            self.log.clone_from(&other.log);
        }
        self.telnet = other.telnet.or(self.telnet);
        self.buffering = other.buffering.or(self.buffering);
        self.modem_control = other.modem_control.or(self.modem_control);
        self.datagram = other.datagram.or(self.datagram);
        self.packet = other.packet.or(self.packet);
        self.speed = other.speed.or(self.speed);
        self.loopback |= other.loopback;
        self.half_duplex |= other.half_duplex;
    }

    /// Combine with the multiplexer defaults.
    pub(crate) fn resolve(&self, line: usize, mux: &MuxConfig) -> Result<LineSettings> {
        let datagram = self.datagram.unwrap_or(mux.datagram);
        if datagram {
            if self.telnet == Some(true) {
                return Err(MuxError::invalid(format!(
                    "line {line}: Telnet framing is not available on datagram lines"
                )));
            }
            if self.port.is_none() || self.destination.is_none() {
                return Err(MuxError::invalid(format!(
                    "line {line}: datagram lines need a listen port and a destination"
                )));
            }
        }
        let buffering = self.buffering.unwrap_or(mux.buffering);
        validate_buffering(buffering)?;
        Ok(LineSettings {
            port: self.port.clone(),
            destination: self.destination.clone(),
            telnet: !datagram && self.telnet.unwrap_or(mux.telnet),
            buffering,
            modem_control: self.modem_control.unwrap_or(mux.modem_control),
            datagram,
            packet: self.packet.unwrap_or(mux.packet),
            loopback: self.loopback,
            half_duplex: self.half_duplex,
            speed: self.speed,
            log: self.log.clone(),
        })
    }
}

/// Effective settings of one line.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LineSettings {
    pub port: Option<String>,
    pub destination: Option<String>,
    pub telnet: bool,
    pub buffering: Buffering,
    pub modem_control: bool,
    pub datagram: bool,
    pub packet: bool,
    pub loopback: bool,
    pub half_duplex: bool,
    pub speed: Option<Speed>,
    pub log: Option<PathBuf>,
}

impl LineSettings {
    pub(crate) fn defaults(mux: &MuxConfig) -> Self {
        Self {
            port: None,
            destination: None,
            telnet: mux.telnet && !mux.datagram,
            buffering: mux.buffering,
            modem_control: mux.modem_control,
            datagram: false,
            packet: mux.packet,
            loopback: false,
            half_duplex: false,
            speed: None,
            log: None,
        }
    }
}

/// A parsed attach string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttachSpec {
    /// Options given before any `Line=n`; `port` is the shared listener
    pub defaults: LineConfig,
    /// Options following each `Line=n`
    pub lines: BTreeMap<usize, LineConfig>,
}

impl AttachSpec {
    /// Parse a comma separated attach string.
    ///
    /// Keywords are case-insensitive. A token without `=` that is not a
    /// keyword is a listen port, optionally followed by `;telnet` or
    /// `;notelnet`.
    pub fn parse(spec: &str) -> Result<AttachSpec> {
        let mut parsed = AttachSpec::default();
        let mut current: Option<usize> = None;

        for token in spec.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (token, None),
            };
            let upper = key.to_ascii_uppercase();

            if upper == "LINE" {
                let value = require(&upper, value)?;
                let line = value
                    .parse()
                    .map_err(|_| MuxError::invalid(format!("bad line number '{value}'")))?;
                parsed.lines.entry(line).or_default();
                current = Some(line);
                continue;
            }

            let target = match current {
                Some(line) => parsed.lines.entry(line).or_default(),
                None => &mut parsed.defaults,
            };
            match (upper.as_str(), value) {
                ("CONNECT", Some(value)) => {
                    let (destination, telnet) = split_telnet_suffix(value)?;
                    target.destination = Some(destination.to_string());
                    target.telnet = telnet.or(target.telnet);
                }
                ("BUFFERED", None) => {
                    target.buffering = Some(Buffering::Buffered(DEFAULT_BUFFERED_SIZE));
                }
                ("BUFFERED", Some(value)) => {
                    let size = value
                        .parse()
                        .map_err(|_| MuxError::invalid(format!("bad buffer size '{value}'")))?;
                    let buffering = Buffering::Buffered(size);
                    validate_buffering(buffering)?;
                    target.buffering = Some(buffering);
                }
                ("NOBUFFERED" | "UNBUFFERED", None) => {
                    target.buffering = Some(Buffering::Unbuffered);
                }
                ("MODEM", None) => target.modem_control = Some(true),
                ("NOMODEM", None) => target.modem_control = Some(false),
                ("DATAGRAM" | "UDP", None) => target.datagram = Some(true),
                ("STREAM" | "TCP", None) => target.datagram = Some(false),
                ("PACKET", None) => target.packet = Some(true),
                ("LOOPBACK", None) => target.loopback = true,
                ("SPEED", Some(value)) => target.speed = Some(parse_speed(value)?),
                ("LOG", Some(value)) => target.log = Some(PathBuf::from(value)),
                ("NOLOG", None) => target.log = None,
                (_, None) if looks_like_port(key) => {
                    let (port, telnet) = split_telnet_suffix(key)?;
                    target.port = Some(port.to_string());
                    target.telnet = telnet.or(target.telnet);
                }
                _ => {
                    return Err(MuxError::invalid(format!("unknown attach option '{token}'")));
                }
            }
            if target.datagram == Some(true) && target.telnet == Some(true) {
                return Err(MuxError::invalid(
                    "Telnet framing is not available on datagram lines",
                ));
            }
        }
        Ok(parsed)
    }
}

fn require<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| MuxError::invalid(format!("{key} needs a value")))
}

fn looks_like_port(token: &str) -> bool {
    let address = token.split(';').next().unwrap_or(token);
    address.chars().all(|c| c.is_ascii_digit())
        || address
            .rsplit_once(':')
            .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
}

fn split_telnet_suffix(value: &str) -> Result<(&str, Option<bool>)> {
    match value.split_once(';') {
        None => Ok((value, None)),
        Some((address, suffix)) => match suffix.trim().to_ascii_uppercase().as_str() {
            "TELNET" => Ok((address, Some(true))),
            "NOTELNET" => Ok((address, Some(false))),
            _ => Err(MuxError::invalid(format!("unknown modifier ';{suffix}'"))),
        },
    }
}

/// Bind address for a port string; a bare number listens on every interface.
pub(crate) fn listen_address(port: &str) -> String {
    if port.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{port}")
    } else {
        port.to_string()
    }
}
