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

//! Connection multiplexer
//!
//! The [`Multiplexer`] is responsible for:
//! - Accepting callers on the shared listener and picking a line for them
//! - Per-line listeners and outbound ("null modem") connections
//! - Holding one unanswered call while modem-controlled lines ring
//! - Moving bytes between sockets and each line's rings
//! - Connection and disconnection notices
//!
//! Nothing blocks. Outbound connects complete on later polls and are
//! abandoned after the configured connect timeout. The host drives
//! everything by calling
//! [`Multiplexer::poll_connections`], [`Multiplexer::poll_rx`] and
//! [`Multiplexer::poll_tx`] from its own loop.

use crate::clock::{CheckOrder, Clock, RandomOrder, SystemClock};
use crate::config::{
    AttachSpec, LineConfig, LineSettings, MuxConfig, UNBUFFERED_SIZE, parse_line_order,
};
use crate::line::{Line, MANTRA};
use crate::modem::ModemBits;
use crate::transport::{self, Connection, LoopbackBuffer, Outbound};
use crate::types::{LineInfo, RxChar};
use crate::{MuxError, Result};
use bytes::Bytes;
use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const ALL_BUSY: &str = "All connections busy\r\n";
const NO_ANSWER: &str = "No answer on any connection\r\n";
const LINE_BUSY: &str = "Line connection busy\r\n";
const LINE_UNAVAILABLE: &str = "Line connection not available\r\n";
const UNEXPECTED_SOURCE: &str = "Rejecting connection from unexpected source\r\n";

/// A caller waiting for a modem-controlled line to answer.
struct RingingCall {
    connection: Connection,
    peer: SocketAddr,
}

/// A set of lines sharing one attach configuration.
pub struct Multiplexer {
    config: MuxConfig,
    line_configs: Vec<LineConfig>,
    lines: Vec<Line>,
    order: Vec<usize>,
    master: Option<TcpListener>,
    ring: Option<RingingCall>,
    ring_start: Option<Duration>,
    last_poll: Option<Duration>,
    sessions: u64,
    attached: bool,
    clock: Box<dyn Clock>,
    check_order: Box<dyn CheckOrder>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("config", &self.config)
            .field("lines", &self.lines.len())
            .field("attached", &self.attached)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Multiplexer {
    /// Create a detached multiplexer.
    pub fn new(config: MuxConfig) -> Result<Self> {
        config.validate()?;
        let lines = (0..config.lines)
            .map(|index| Line::new(index, LineSettings::defaults(&config)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            line_configs: vec![LineConfig::default(); config.lines],
            lines,
            order: Vec::new(),
            master: None,
            ring: None,
            ring_start: None,
            last_poll: None,
            sessions: 0,
            attached: false,
            clock: Box::new(SystemClock::default()),
            check_order: Box::new(RandomOrder::new()),
            config,
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the outbound-versus-listener check order.
    pub fn with_check_order(mut self, order: impl CheckOrder + 'static) -> Self {
        self.check_order = Box::new(order);
        self
    }

    /// Multiplexer configuration.
    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Number of lines.
    pub fn lines(&self) -> usize {
        self.lines.len()
    }

    /// Callers accepted so far.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Check if the multiplexer is attached
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Address of the shared listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.master.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of a line's own listener.
    pub fn line_local_addr(&self, line: usize) -> Result<Option<SocketAddr>> {
        Ok(self
            .line(line)?
            .listener
            .as_ref()
            .and_then(|l| l.local_addr().ok()))
    }

    fn line(&self, line: usize) -> Result<&Line> {
        self.lines.get(line).ok_or(MuxError::InvalidLine(line))
    }

    fn line_mut(&mut self, line: usize) -> Result<&mut Line> {
        self.lines.get_mut(line).ok_or(MuxError::InvalidLine(line))
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Set overrides for one line; takes effect at the next attach.
    pub fn configure_line(&mut self, line: usize, config: LineConfig) -> Result<()> {
        if self.attached {
            return Err(MuxError::AlreadyAttached);
        }
        let slot = self
            .line_configs
            .get_mut(line)
            .ok_or(MuxError::InvalidLine(line))?;
        *slot = config;
        Ok(())
    }

    /// Set the order callers on the shared listener are offered lines.
    pub fn set_line_order(&mut self, order: &str) -> Result<()> {
        self.order = parse_line_order(order, self.lines.len())?;
        Ok(())
    }

    /// Parse an attach string and attach.
    pub fn attach(&mut self, spec: &str) -> Result<()> {
        let spec = AttachSpec::parse(spec)?;
        self.attach_spec(&spec)
    }

    /// Open listeners and prepare every line.
    pub fn attach_spec(&mut self, spec: &AttachSpec) -> Result<()> {
        if self.attached {
            return Err(MuxError::AlreadyAttached);
        }
        let count = self.lines.len();
        if let Some(&line) = spec.lines.keys().find(|&&line| line >= count) {
            return Err(MuxError::InvalidLine(line));
        }

        let mut config = self.config.clone();
        let defaults = &spec.defaults;
        config.telnet = defaults.telnet.unwrap_or(config.telnet);
        config.buffering = defaults.buffering.unwrap_or(config.buffering);
        config.packet = defaults.packet.unwrap_or(config.packet);
        config.modem_control = defaults.modem_control.unwrap_or(config.modem_control);

        let mut master_port = defaults.port.clone().or_else(|| config.port.clone());
        let mut base = LineConfig {
            port: None,
            telnet: None,
            buffering: None,
            packet: None,
            modem_control: None,
            ..defaults.clone()
        };
        if base.destination.is_some() && count > 1 {
            return Err(MuxError::invalid(
                "Connect= needs Line= on a multi-line multiplexer",
            ));
        }
        if count == 1 && base.datagram == Some(true) {
            base.port = master_port.take();
        }
        config.port = master_port;

        let mut lines = Vec::with_capacity(count);
        for index in 0..count {
            let mut line_config = base.clone();
            line_config.merge(&self.line_configs[index]);
            if let Some(overrides) = spec.lines.get(&index) {
                line_config.merge(overrides);
            }
            let settings = line_config.resolve(index, &config)?;
            if let Some(destination) = &settings.destination {
                transport::resolve(destination)?;
            }
            let mut line = Line::new(index, settings)?;
            line.modem = self.lines[index].modem;
            line.open_log()?;
            if let Some(port) = &line.settings.port {
                if !line.settings.datagram {
                    line.listener = Some(transport::listen(port)?);
                }
            }
            lines.push(line);
        }
        let master = match &config.port {
            Some(port) => Some(transport::listen(port)?),
            None => None,
        };

        for line in &mut lines {
            line.refresh_modem(master.is_some());
        }
        info!(
            sim = %config.sim_name,
            lines = count,
            address = ?master.as_ref().and_then(|l| l.local_addr().ok()),
            "multiplexer attached"
        );
        self.config = config;
        self.lines = lines;
        self.master = master;
        self.ring = None;
        self.ring_start = None;
        self.last_poll = None;
        self.attached = true;
        Ok(())
    }

    /// Close every line and listener.
    pub fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Err(MuxError::NotAttached);
        }
        for index in 0..self.lines.len() {
            if self.lines[index].connection.is_some() {
                self.report_disconnection(index);
            }
            self.disconnect(index, false);
            let line = &mut self.lines[index];
            line.listener = None;
            line.conn = false;
            line.connect_pending = false;
            line.modem.set_ring(false);
            line.refresh_modem(false);
        }
        if let Some(call) = self.ring.take() {
            call.connection.close();
        }
        self.master = None;
        self.ring_start = None;
        self.attached = false;
        info!(sim = %self.config.sim_name, "multiplexer detached");
        Ok(())
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Look for a new connection on any line.
    ///
    /// Returns the line that became connected, if any. Does nothing until
    /// the poll interval has passed since the previous poll.
    pub fn poll_connections(&mut self) -> Result<Option<usize>> {
        if !self.attached {
            return Err(MuxError::NotAttached);
        }
        let now = self.clock.now();
        if let Some(last) = self.last_poll {
            if now.saturating_sub(last) < self.config.poll_interval {
                return Ok(None);
            }
        }
        self.last_poll = Some(now);

        if let Some(line) = self.poll_shared_listener(now) {
            return Ok(Some(line));
        }
        for index in 0..self.lines.len() {
            if let Some(line) = self.poll_line(index, now) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn poll_shared_listener(&mut self, now: Duration) -> Option<usize> {
        let call = match self.ring.take() {
            Some(call) => call,
            None => {
                let master = self.master.as_ref()?;
                match transport::accept(master) {
                    Ok(Some((connection, peer))) => {
                        self.count_session();
                        debug!(%peer, "incoming connection");
                        RingingCall { connection, peer }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        return None;
                    }
                }
            }
        };

        let candidates: Vec<usize> = if self.order.is_empty() {
            (0..self.lines.len()).collect()
        } else {
            self.order.clone()
        };
        let eligible = candidates.into_iter().find(|&index| {
            let line = &self.lines[index];
            line.accepts_shared() && (!line.settings.modem_control || line.modem.dtr())
        });
        if let Some(index) = eligible {
            self.connect_line(index, call.connection, call.peer, now);
            return Some(index);
        }

        let shared = self.master.is_some();
        let mut ringable = 0;
        for line in &mut self.lines {
            if line.accepts_shared() && !line.modem.dtr() {
                ringable += 1;
                line.modem.set_ring(true);
                line.refresh_modem(shared);
            }
        }
        if ringable == 0 {
            refuse(call.connection, call.peer, ALL_BUSY);
            return None;
        }
        match self.ring_start {
            None => {
                info!(peer = %call.peer, lines = ringable, "ringing");
                self.ring_start = Some(now);
                self.store_ring(call);
            }
            Some(start) if now.saturating_sub(start) < self.config.ring_timeout => {
                self.store_ring(call);
            }
            Some(_) => {
                self.clear_rings();
                self.ring_start = None;
                refuse(call.connection, call.peer, NO_ANSWER);
            }
        }
        None
    }

    fn store_ring(&mut self, call: RingingCall) {
        if let Some(superseded) = self.ring.replace(call) {
            warn!(peer = %superseded.peer, "closing superseded ringing call");
            superseded.connection.close();
        }
    }

    fn clear_rings(&mut self) {
        let shared = self.master.is_some();
        for line in &mut self.lines {
            if !line.conn
                && line.settings.destination.is_none()
                && line.settings.port.is_none()
                && line.modem.ringing()
            {
                line.modem.set_ring(false);
                line.refresh_modem(shared);
            }
        }
    }

    fn poll_line(&mut self, index: usize, now: Duration) -> Option<usize> {
        let shared = self.master.is_some();
        if self.lines[index].connect_pending {
            let line = &mut self.lines[index];
            line.connect_pending = false;
            line.init();
            line.reset_refusals();
            line.conn = true;
            line.connected_at = Some(now);
            line.refresh_modem(shared);
            info!(line = index, "loopback connected");
            return Some(index);
        }
        if self.lines[index].settings.loopback {
            return None;
        }

        let outbound_first = self.check_order.outbound_first(index);
        for step in 0..2 {
            let found = if (step == 0) == outbound_first {
                self.promote_outbound(index, now)
            } else {
                self.accept_on_line(index, now)
            };
            if found.is_some() {
                return found;
            }
        }

        let line = &self.lines[index];
        if line.settings.destination.is_some()
            && line.connection.is_none()
            && line.connecting.is_none()
            && (!line.settings.modem_control || line.modem.dtr())
        {
            self.start_outbound(index);
        }
        None
    }

    fn promote_outbound(&mut self, index: usize, now: Duration) -> Option<usize> {
        let shared = self.master.is_some();
        let line = &mut self.lines[index];
        if line.conn {
            return None;
        }
        match line.connecting.as_ref()?.is_ready() {
            Ok(true) => {}
            Ok(false) => {
                let started = line.connect_started.unwrap_or(now);
                if now.saturating_sub(started) >= self.config.connect_timeout {
                    warn!(
                        line = index,
                        destination = ?line.settings.destination,
                        "outbound connection timed out"
                    );
                    line.abandon_connect();
                }
                return None;
            }
            Err(e) => {
                warn!(
                    line = index,
                    destination = ?line.settings.destination,
                    error = %e,
                    "outbound connection failed"
                );
                line.abandon_connect();
                return None;
            }
        }
        line.connect_started = None;
        let connection = match line.connecting.take()?.into_connection() {
            Ok(connection) => connection,
            Err(e) => {
                warn!(line = index, error = %e, "outbound connection lost");
                return None;
            }
        };
        line.init();
        line.reset_refusals();
        if !line.keeps_output() {
            line.discard_output();
        }
        line.peer = connection.peer_addr();
        line.connection = Some(connection);
        line.conn = true;
        line.connected_at = Some(now);
        line.refresh_modem(shared);
        info!(
            line = index,
            destination = ?line.settings.destination,
            "outbound connection established"
        );
        Some(index)
    }

    fn accept_on_line(&mut self, index: usize, now: Duration) -> Option<usize> {
        loop {
            let accepted = match &self.lines[index].listener {
                Some(listener) => transport::accept(listener),
                None => return None,
            };
            let (connection, peer) = match accepted {
                Ok(Some(pair)) => pair,
                Ok(None) => return None,
                Err(e) => {
                    warn!(line = index, error = %e, "accept failed");
                    return None;
                }
            };
            self.count_session();
            debug!(line = index, %peer, "incoming line connection");

            let line = &mut self.lines[index];
            if let Some(destination) = &line.settings.destination {
                if !source_matches(destination, peer) {
                    warn!(line = index, %peer, %destination, "unexpected source");
                    refuse(connection, peer, UNEXPECTED_SOURCE);
                    continue;
                }
                if line.connecting.is_some() {
                    debug!(line = index, "abandoning outbound attempt for incoming call");
                    line.abandon_connect();
                }
            }
            if line.conn {
                refuse(connection, peer, LINE_BUSY);
            } else if !line.settings.modem_control || line.modem.dtr() {
                self.connect_line(index, connection, peer, now);
                return Some(index);
            } else {
                refuse(connection, peer, LINE_UNAVAILABLE);
            }
        }
    }

    fn start_outbound(&mut self, index: usize) {
        let now = self.clock.now();
        let line = &mut self.lines[index];
        let Some(destination) = line.settings.destination.clone() else {
            return;
        };
        let result = if line.settings.datagram {
            match &line.settings.port {
                Some(port) => Connection::udp(port, &destination).map(Outbound::Ready),
                None => return,
            }
        } else {
            Outbound::connect(&destination)
        };
        match result {
            Ok(outbound) => {
                debug!(line = index, %destination, "outbound connection started");
                line.connecting = Some(outbound);
                line.connect_started = Some(now);
            }
            Err(e) => {
                warn!(line = index, %destination, error = %e, "outbound connection failed");
            }
        }
    }

    fn count_session(&mut self) {
        self.sessions += 1;
        metrics::counter!("telmux.sessions.total").increment(1);
    }

    fn connect_line(&mut self, index: usize, connection: Connection, peer: SocketAddr, now: Duration) {
        let shared = self.master.is_some();
        let line = &mut self.lines[index];
        line.connection = Some(connection);
        line.peer = Some(peer);
        line.conn = true;
        line.init();
        if line.telnet() {
            line.reset_refusals();
            if let Some(connection) = &mut line.connection {
                if let Err(e) = connection.write(&MANTRA) {
                    debug!(line = index, error = %e, "option offer not sent");
                }
            }
        }
        self.report_connection(index);
        let line = &mut self.lines[index];
        line.connected_at = Some(now);
        line.refresh_modem(shared);
        info!(line = index, %peer, "line connected");
    }

    fn report_connection(&mut self, index: usize) {
        let message = if self.lines[index].telnet() {
            let mut message = format!("\n\r\nConnected to the {} simulator ", self.config.sim_name);
            if let Some(device) = &self.config.device_name {
                message.push_str(&format!("{device} device"));
                if self.lines.len() > 1 {
                    message.push_str(&format!(", line {index}"));
                }
            }
            message.push_str("\r\n\n");
            message
        } else {
            String::new()
        };

        let line = &mut self.lines[index];
        if !line.settings.buffering.is_buffered() {
            line.discard_output();
            line.stats = Default::default();
        } else if message.len() > line.tx.reserved_free() {
            line.tx.consume(message.len() - line.tx.reserved_free());
        }
        if line.tx.prepend(message.as_bytes()).is_err() {
            warn!(line = index, "connection notice does not fit");
        }
        if self.flush_line(index) == 0 {
            self.lines[index].xmte = true;
        }
    }

    fn report_disconnection(&mut self, index: usize) {
        let message = format!("\r\nDisconnected from the {} simulator\r\n\n", self.config.sim_name);
        let line = &mut self.lines[index];
        if !line.telnet() {
            return;
        }
        if line.tx.write_reserved(message.as_bytes()).is_err() {
            debug!(line = index, "no room for disconnection notice");
        }
    }

    /// Flush, close the connection and, unless `reconnect` is false, restart
    /// an outbound connection.
    fn disconnect(&mut self, index: usize, reconnect: bool) {
        let shared = self.master.is_some();
        let line = &mut self.lines[index];
        if let Err(e) = line.send_buffered() {
            debug!(line = index, error = %e, "final flush failed");
        }
        if let Some(connection) = line.connection.take() {
            connection.close();
            line.reset_refusals();
            line.conn = false;
            line.connected_at = None;
            line.xmte = true;
        }
        line.peer = None;
        if line.settings.destination.is_some() {
            line.abandon_connect();
            if reconnect && (!line.settings.modem_control || line.modem.dtr()) {
                self.start_outbound(index);
            }
        }
        let line = &mut self.lines[index];
        line.init();
        line.refresh_modem(shared);
    }

    /// Flush and drop the line's connection without a notice.
    pub fn reset_line(&mut self, line: usize) -> Result<()> {
        self.line(line)?;
        self.disconnect(line, true);
        Ok(())
    }

    /// Send the disconnection notice, flush and drop the connection.
    pub fn close_line(&mut self, line: usize) -> Result<()> {
        if self.line(line)?.connection.is_some() {
            self.report_disconnection(line);
            info!(line, "line disconnected");
        }
        self.disconnect(line, true);
        Ok(())
    }

    /// Check if a line has a peer
    pub fn is_connected(&self, line: usize) -> Result<bool> {
        Ok(self.line(line)?.conn)
    }

    /// Snapshot of one line.
    pub fn line_info(&self, line: usize) -> Result<LineInfo> {
        Ok(self.line(line)?.info(self.clock.now()))
    }

    // ========================================================================
    // Modem control
    // ========================================================================

    /// Drive DTR/RTS and return the resulting signals.
    ///
    /// Raising DTR on a ringing line answers the waiting call. Dropping DTR
    /// hangs up.
    pub fn set_get_modem_bits(
        &mut self,
        line: usize,
        set: ModemBits,
        clear: ModemBits,
    ) -> Result<ModemBits> {
        let shared = self.master.is_some();
        let now = self.clock.now();
        let index = line;
        let line = self.line_mut(index)?;
        let before = line.modem.drive(set, clear)?;
        let raised_dtr = !before.contains(ModemBits::DTR) && line.modem.dtr();
        let dropped_dtr = before.contains(ModemBits::DTR) && !line.modem.dtr();

        let answers = raised_dtr
            && before.contains(ModemBits::RNG)
            && line.connection.is_none()
            && !line.conn
            && line.settings.destination.is_none()
            && line.settings.port.is_none();
        if answers {
            if let Some(call) = self.ring.take() {
                info!(line = index, peer = %call.peer, "ring answered");
                self.ring_start = None;
                self.connect_line(index, call.connection, call.peer, now);
                self.clear_rings();
            }
        }

        let line = &mut self.lines[index];
        line.refresh_modem(shared);
        if line.settings.modem_control && line.loopback.is_some() {
            if raised_dtr || dropped_dtr {
                line.connect_pending = raised_dtr;
                if dropped_dtr {
                    line.conn = false;
                }
                line.refresh_modem(shared);
            }
        } else if line.connection.is_some() || line.connecting.is_some() {
            if dropped_dtr {
                if line.connection.is_some() {
                    self.report_disconnection(index);
                    info!(line = index, "DTR dropped, line disconnected");
                }
                self.disconnect(index, true);
            }
        } else if line.settings.modem_control && line.settings.destination.is_some() && raised_dtr
        {
            self.start_outbound(index);
        }
        Ok(self.lines[index].modem.bits())
    }

    /// Route a line's output back to its own input.
    pub fn set_loopback(&mut self, line: usize, enable: bool) -> Result<()> {
        let line = self.line_mut(line)?;
        if line.loopback.is_some() == enable {
            return Ok(());
        }
        line.settings.loopback = enable;
        if enable {
            line.loopback = Some(LoopbackBuffer::new(line.rx.capacity(), line.settings.datagram)?);
            if !line.conn {
                line.connect_pending = true;
            }
        } else {
            line.loopback = None;
            line.connect_pending = false;
            if line.connection.is_none() {
                line.conn = false;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Read every connected line.
    ///
    /// Errors that end one line do not stop the others; the first typed
    /// error is returned after all lines were serviced.
    pub fn poll_rx(&mut self) -> Result<()> {
        let mut first = None;
        for index in 0..self.lines.len() {
            if let Err(e) = self.read(index) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Read one line's peer into its receive ring.
    ///
    /// Returns the number of bytes read from the peer.
    pub fn read(&mut self, line: usize) -> Result<usize> {
        let index = line;
        let line = self.line_mut(index)?;
        if line.connection.is_none() && line.loopback.is_none() {
            return Ok(0);
        }
        let limit = line.read_limit();
        if limit == 0 {
            return Ok(0);
        }
        let mut buf = [0u8; UNBUFFERED_SIZE];
        let limit = limit.min(buf.len());
        match line.read_peer(&mut buf[..limit]) {
            Ok(0) => Ok(0),
            Ok(count) => {
                trace!(line = index, count, "received");
                metrics::counter!("telmux.bytes.received").increment(count as u64);
                line.receive(&buf[..count])?;
                Ok(count)
            }
            Err(e) => {
                if line.settings.datagram {
                    debug!(line = index, error = %e, "datagram receive error ignored");
                    return Ok(0);
                }
                match &e {
                    MuxError::Io(io) if transport::is_disconnect(io) => {
                        info!(line = index, "peer closed the connection");
                    }
                    other => warn!(line = index, error = %other, "receive failed"),
                }
                if !line.keeps_output() {
                    line.discard_output();
                }
                self.disconnect(index, true);
                Ok(0)
            }
        }
    }

    /// Next received character, or `None` when nothing is waiting.
    pub fn getc(&mut self, line: usize) -> Result<Option<RxChar>> {
        let line = self.line_mut(line)?;
        if !line.conn {
            return Ok(None);
        }
        Ok(line.getc())
    }

    /// Received characters waiting to be read.
    pub fn rx_pending(&self, line: usize) -> Result<usize> {
        Ok(self.line(line)?.rx.len())
    }

    /// Next complete packet.
    pub fn get_packet(&mut self, line: usize) -> Result<Option<Bytes>> {
        let line = self.line_mut(line)?;
        if !line.conn {
            return Err(MuxError::Lost);
        }
        Ok(line.get_packet())
    }

    // ========================================================================
    // Transmit
    // ========================================================================

    /// Queue one character.
    ///
    /// [`MuxError::Stall`] means the transmit ring is full; retry after
    /// [`Multiplexer::poll_tx`]. [`MuxError::Lost`] means the line has no
    /// connection.
    pub fn putc(&mut self, line: usize, byte: u8) -> Result<()> {
        self.line_mut(line)?.putc(byte)
    }

    /// Queue as much of `bytes` as fits and return how much was taken.
    pub fn write(&mut self, line: usize, bytes: &[u8]) -> Result<usize> {
        let line = self.line_mut(line)?;
        let mut written = 0;
        for &byte in bytes {
            match line.putc(byte) {
                Ok(()) => written += 1,
                Err(e) if written == 0 => return Err(e),
                Err(_) => break,
            }
        }
        Ok(written)
    }

    /// Write queued output on every connected line.
    pub fn poll_tx(&mut self) {
        for index in 0..self.lines.len() {
            let line = &self.lines[index];
            if !line.conn || line.tx.is_empty() {
                continue;
            }
            if self.flush_line(index) == 0 {
                self.lines[index].xmte = true;
            }
        }
    }

    /// Write a line's queued output and return what is still queued.
    pub fn flush(&mut self, line: usize) -> Result<usize> {
        self.line(line)?;
        Ok(self.flush_line(line))
    }

    fn flush_line(&mut self, index: usize) -> usize {
        let line = &mut self.lines[index];
        match line.send_buffered() {
            Ok(remaining) => remaining,
            Err(e) => {
                if transport::is_disconnect(&e) {
                    info!(line = index, "peer closed the connection");
                } else {
                    warn!(line = index, error = %e, "send failed");
                }
                line.discard_output();
                self.disconnect(index, true);
                0
            }
        }
    }

    /// Check if the device may keep transmitting
    pub fn tx_enabled(&self, line: usize) -> Result<bool> {
        Ok(self.line(line)?.xmte)
    }

    /// Bytes waiting to be written to the peer.
    pub fn tx_pending(&self, line: usize) -> Result<usize> {
        Ok(self.line(line)?.tx.len())
    }

    /// Send one packet.
    ///
    /// Returns [`MuxError::Stall`] while the previous packet is still being
    /// queued.
    pub fn put_packet(&mut self, line: usize, payload: &[u8]) -> Result<()> {
        let index = line;
        let line = self.line_mut(index)?;
        if !line.conn && !line.keeps_output() {
            return Err(MuxError::Lost);
        }
        line.framer.begin_send(payload)?;
        line.refill_packet();
        if line.conn {
            self.flush_line(index);
        }
        let line = &mut self.lines[index];
        if line.conn || line.keeps_output() {
            Ok(())
        } else {
            line.discard_output();
            Err(MuxError::Lost)
        }
    }
}

/// Tell a caller why they are not being connected and hang up.
fn refuse(mut connection: Connection, peer: SocketAddr, message: &str) {
    warn!(%peer, reason = message.trim_end(), "connection refused");
    metrics::counter!("telmux.connections.refused").increment(1);
    if let Err(e) = connection.write(message.as_bytes()) {
        debug!(%peer, error = %e, "refusal not delivered");
    }
    connection.close();
}

fn source_matches(destination: &str, peer: SocketAddr) -> bool {
    transport::resolve(destination)
        .map(|addresses| addresses.iter().any(|address| address.ip() == peer.ip()))
        .unwrap_or(false)
}
