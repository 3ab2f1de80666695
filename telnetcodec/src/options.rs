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

use crate::consts::option;
use std::collections::BTreeMap;
use std::fmt::Formatter;

///
/// [Telnet Terminal Options](https://www.iana.org/assignments/telnet-options/telnet-options.xhtml)
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum TelnetOption {
    /// [`option::BINARY`] Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    TransmitBinary,
    /// [`option::ECHO`] Echo [RFC857](https://tools.ietf.org/html/rfc857)
    Echo,
    /// [`option::RCP`] Prepare to reconnect
    Reconnection,
    /// [`option::SGA`] Suppress Go Ahead [RFC858](https://tools.ietf.org/html/rfc858)
    SuppressGoAhead,
    /// [`option::NAMS`] Negotiate Approximate Message Size
    NegotiateApproxMessageSize,
    /// [`option::STATUS`] Status [RFC859](https://tools.ietf.org/html/rfc859)
    Status,
    /// [`option::TM`] Timing Mark [RFC860](https://tools.ietf.org/html/rfc860)
    TimingMark,
    /// [`option::RCTE`] Remote Controlled Transmission and Echo
    RCTE,
    /// [`option::NAOL`] Output Line Width
    OutLineWidth,
    /// [`option::NAOP`] Output Page Size
    OutPageSize,
    /// [`option::NAOCRD`] Output Carriage-Return Disposition
    NAOCRD,
    /// [`option::NAOHTS`] Output Horizontal Tab Stops
    NAOHTS,
    /// [`option::NAOHTD`] Output Horizontal Tab Disposition
    NAOHTD,
    /// [`option::NAOFFD`] Output Formfeed Disposition
    NAOFFD,
    /// [`option::NAOVTS`] Output Vertical Tabstops
    NAOVTS,
    /// [`option::NAOVTD`] Output Vertical Tab Disposition
    NAOVTD,
    /// [`option::NAOLFD`] Output Linefeed Disposition
    NAOLFD,
    /// [`option::XASCII`] Extended ASCII
    XASCII,
    /// [`option::LOGOUT`] Logout
    Logout,
    /// [`option::BM`] Byte Macro
    ByteMacro,
    /// [`option::DET`] Data Entry Terminal
    DET,
    /// [`option::SUPDUP`] SUPDUP
    SUPDUP,
    /// [`option::SUPDUP_OUTPUT`] SUPDUP Output
    SUPDUPOutput,
    /// [`option::SNDLOC`] Send Location
    SNDLOC,
    /// [`option::TTYPE`] Terminal Type [RFC1091](https://tools.ietf.org/html/rfc1091)
    TTYPE,
    /// [`option::EOR`] End of Record [RFC885](https://tools.ietf.org/html/rfc885)
    EOR,
    /// [`option::TUID`] TACACS User Identification
    TUID,
    /// [`option::OUTMRK`] Output Marking
    OUTMRK,
    /// [`option::TTYLOC`] Terminal Location Number
    TTYLOC,
    /// [`option::REGIME_3270`] Telnet 3270 Regime
    Regime3270,
    /// [`option::X3PAD`] X.3 PAD
    X3PAD,
    /// [`option::NAWS`] Negotiate About Window Size [RFC1073](https://tools.ietf.org/html/rfc1073)
    NAWS,
    /// [`option::TSPEED`] Terminal Speed
    TerminalSpeed,
    /// [`option::LFLOW`] Remote Flow Control
    ToggleFlowControl,
    /// [`option::LINEMODE`] Linemode [RFC1184](https://tools.ietf.org/html/rfc1184)
    Linemode,
    /// [`option::XDISPLOC`] X Display Location
    XDisplayLocation,
    /// [`option::ENVIRON`] Environment Option [RFC1408](https://tools.ietf.org/html/rfc1408)
    Environment,
    /// [`option::AUTHENTICATION`] Authentication
    Authentication,
    /// [`option::ENCRYPT`] Encryption
    Encryption,
    /// [`option::NEW_ENVIRON`] New Environment Option [RFC1572](https://tools.ietf.org/html/rfc1572)
    NewEnvironment,
    /// [`option::TN3270E`] TN3270 Enhancements
    TN3270E,
    /// [`option::CHARSET`] Charset
    Charset,
    /// [`option::COMPORT`] Com Port Control
    ComPort,
    /// [`option::KERMIT`] Kermit
    Kermit,
    /// [`option::EXOPL`] Extended Options List
    EXOPL,
    /// Any option code without a dedicated variant
    Unknown(u8),
}

impl TelnetOption {
    /// Wire code of this option.
    pub fn to_u8(&self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => option::BINARY,
            TelnetOption::Echo => option::ECHO,
            TelnetOption::Reconnection => option::RCP,
            TelnetOption::SuppressGoAhead => option::SGA,
            TelnetOption::NegotiateApproxMessageSize => option::NAMS,
            TelnetOption::Status => option::STATUS,
            TelnetOption::TimingMark => option::TM,
            TelnetOption::RCTE => option::RCTE,
            TelnetOption::OutLineWidth => option::NAOL,
            TelnetOption::OutPageSize => option::NAOP,
            TelnetOption::NAOCRD => option::NAOCRD,
            TelnetOption::NAOHTS => option::NAOHTS,
            TelnetOption::NAOHTD => option::NAOHTD,
            TelnetOption::NAOFFD => option::NAOFFD,
            TelnetOption::NAOVTS => option::NAOVTS,
            TelnetOption::NAOVTD => option::NAOVTD,
            TelnetOption::NAOLFD => option::NAOLFD,
            TelnetOption::XASCII => option::XASCII,
            TelnetOption::Logout => option::LOGOUT,
            TelnetOption::ByteMacro => option::BM,
            TelnetOption::DET => option::DET,
            TelnetOption::SUPDUP => option::SUPDUP,
            TelnetOption::SUPDUPOutput => option::SUPDUP_OUTPUT,
            TelnetOption::SNDLOC => option::SNDLOC,
            TelnetOption::TTYPE => option::TTYPE,
            TelnetOption::EOR => option::EOR,
            TelnetOption::TUID => option::TUID,
            TelnetOption::OUTMRK => option::OUTMRK,
            TelnetOption::TTYLOC => option::TTYLOC,
            TelnetOption::Regime3270 => option::REGIME_3270,
            TelnetOption::X3PAD => option::X3PAD,
            TelnetOption::NAWS => option::NAWS,
            TelnetOption::TerminalSpeed => option::TSPEED,
            TelnetOption::ToggleFlowControl => option::LFLOW,
            TelnetOption::Linemode => option::LINEMODE,
            TelnetOption::XDisplayLocation => option::XDISPLOC,
            TelnetOption::Environment => option::ENVIRON,
            TelnetOption::Authentication => option::AUTHENTICATION,
            TelnetOption::Encryption => option::ENCRYPT,
            TelnetOption::NewEnvironment => option::NEW_ENVIRON,
            TelnetOption::TN3270E => option::TN3270E,
            TelnetOption::Charset => option::CHARSET,
            TelnetOption::ComPort => option::COMPORT,
            TelnetOption::Kermit => option::KERMIT,
            TelnetOption::EXOPL => option::EXOPL,
            TelnetOption::Unknown(byte) => *byte,
        }
    }

    /// Option for a wire code. Codes without a variant map to [`TelnetOption::Unknown`].
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            option::BINARY => TelnetOption::TransmitBinary,
            option::ECHO => TelnetOption::Echo,
            option::RCP => TelnetOption::Reconnection,
            option::SGA => TelnetOption::SuppressGoAhead,
            option::NAMS => TelnetOption::NegotiateApproxMessageSize,
            option::STATUS => TelnetOption::Status,
            option::TM => TelnetOption::TimingMark,
            option::RCTE => TelnetOption::RCTE,
            option::NAOL => TelnetOption::OutLineWidth,
            option::NAOP => TelnetOption::OutPageSize,
            option::NAOCRD => TelnetOption::NAOCRD,
            option::NAOHTS => TelnetOption::NAOHTS,
            option::NAOHTD => TelnetOption::NAOHTD,
            option::NAOFFD => TelnetOption::NAOFFD,
            option::NAOVTS => TelnetOption::NAOVTS,
            option::NAOVTD => TelnetOption::NAOVTD,
            option::NAOLFD => TelnetOption::NAOLFD,
            option::XASCII => TelnetOption::XASCII,
            option::LOGOUT => TelnetOption::Logout,
            option::BM => TelnetOption::ByteMacro,
            option::DET => TelnetOption::DET,
            option::SUPDUP => TelnetOption::SUPDUP,
            option::SUPDUP_OUTPUT => TelnetOption::SUPDUPOutput,
            option::SNDLOC => TelnetOption::SNDLOC,
            option::TTYPE => TelnetOption::TTYPE,
            option::EOR => TelnetOption::EOR,
            option::TUID => TelnetOption::TUID,
            option::OUTMRK => TelnetOption::OUTMRK,
            option::TTYLOC => TelnetOption::TTYLOC,
            option::REGIME_3270 => TelnetOption::Regime3270,
            option::X3PAD => TelnetOption::X3PAD,
            option::NAWS => TelnetOption::NAWS,
            option::TSPEED => TelnetOption::TerminalSpeed,
            option::LFLOW => TelnetOption::ToggleFlowControl,
            option::LINEMODE => TelnetOption::Linemode,
            option::XDISPLOC => TelnetOption::XDisplayLocation,
            option::ENVIRON => TelnetOption::Environment,
            option::AUTHENTICATION => TelnetOption::Authentication,
            option::ENCRYPT => TelnetOption::Encryption,
            option::NEW_ENVIRON => TelnetOption::NewEnvironment,
            option::TN3270E => TelnetOption::TN3270E,
            option::CHARSET => TelnetOption::Charset,
            option::COMPORT => TelnetOption::ComPort,
            option::KERMIT => TelnetOption::Kermit,
            option::EXOPL => TelnetOption::EXOPL,
            byte => TelnetOption::Unknown(byte),
        }
    }
}

impl std::fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetOption::Unknown(byte) => write!(f, "Unknown({byte})"),
            known => write!(f, "{known:?}"),
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(byte: u8) -> Self {
        TelnetOption::from_u8(byte)
    }
}

impl From<TelnetOption> for u8 {
    fn from(option: TelnetOption) -> Self {
        option.to_u8()
    }
}

/// Which end of the connection an option applies to.
///
/// `Local` options are the ones we perform and announce with `WILL`/`WONT`.
/// `Remote` options are the ones the peer performs, requested with `DO`/`DONT`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetSide {
    /// Our side of the connection ("us")
    Local,
    /// The peer's side of the connection ("him")
    Remote,
}

impl std::fmt::Display for TelnetSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetSide::Local => write!(f, "Local"),
            TelnetSide::Remote => write!(f, "Remote"),
        }
    }
}

/// RFC 1143 negotiation state for one side of one option.
///
/// The `*Opposite` variants remember that a request in the other direction
/// arrived while a negotiation was already outstanding, so at most one
/// negotiation per option and side is ever on the wire.
#[derive(Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum QState {
    /// Disabled
    #[default]
    No,
    /// Enabled
    Yes,
    /// Disable requested, awaiting acknowledgement
    WantNo,
    /// Enable requested, awaiting acknowledgement
    WantYes,
    /// Disable requested, re-enable queued behind it
    WantNoOpposite,
    /// Enable requested, disable queued behind it
    WantYesOpposite,
}

impl QState {
    /// Whether the option is currently in effect.
    pub fn is_enabled(self) -> bool {
        matches!(self, QState::Yes)
    }
}

impl std::fmt::Display for QState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QState::No => write!(f, "No"),
            QState::Yes => write!(f, "Yes"),
            QState::WantNo => write!(f, "WantNo"),
            QState::WantYes => write!(f, "WantYes"),
            QState::WantNoOpposite => write!(f, "WantNoOpposite"),
            QState::WantYesOpposite => write!(f, "WantYesOpposite"),
        }
    }
}

/// Q-states of both sides of a single option.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OptionState {
    /// What we perform
    pub us: QState,
    /// What the peer performs
    pub him: QState,
}

/// Declares which sides of an option this end is willing to enable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TelnetSupport {
    /// Option being described
    pub option: TelnetOption,
    /// We will perform it when asked (`DO` is answered with `WILL`)
    pub local: bool,
    /// We accept the peer performing it (`WILL` is answered with `DO`)
    pub remote: bool,
}

impl TelnetSupport {
    /// Support entry for an option.
    pub const fn new(option: TelnetOption, local: bool, remote: bool) -> Self {
        Self {
            option,
            local,
            remote,
        }
    }
}

/// Per-connection option table.
///
/// Entries are created on first reference; options never mentioned by either
/// side take no space and read back as `No`/`No`.
#[derive(Clone, Debug, Default)]
pub struct OptionTable {
    states: BTreeMap<u8, OptionState>,
    support: BTreeMap<u8, TelnetSupport>,
}

impl OptionTable {
    /// Table with the given support declarations.
    pub fn with_support(support: &[TelnetSupport]) -> Self {
        Self {
            states: BTreeMap::new(),
            support: support.iter().map(|s| (s.option.to_u8(), *s)).collect(),
        }
    }

    /// Current state of an option; unreferenced options are `No` on both sides.
    pub fn get(&self, option: TelnetOption) -> OptionState {
        self.states
            .get(&option.to_u8())
            .copied()
            .unwrap_or_default()
    }

    /// Q-state of one side of an option.
    pub fn qstate(&self, option: TelnetOption, side: TelnetSide) -> QState {
        let state = self.get(option);
        match side {
            TelnetSide::Local => state.us,
            TelnetSide::Remote => state.him,
        }
    }

    pub(crate) fn set(&mut self, option: TelnetOption, side: TelnetSide, qstate: QState) {
        let entry = self.states.entry(option.to_u8()).or_default();
        match side {
            TelnetSide::Local => entry.us = qstate,
            TelnetSide::Remote => entry.him = qstate,
        }
    }

    /// Whether we agree to perform `option` when the peer asks.
    pub fn supports_local(&self, option: TelnetOption) -> bool {
        self.support
            .get(&option.to_u8())
            .is_some_and(|s| s.local)
    }

    /// Whether we agree to let the peer perform `option`.
    pub fn supports_remote(&self, option: TelnetOption) -> bool {
        self.support
            .get(&option.to_u8())
            .is_some_and(|s| s.remote)
    }

    /// Number of options referenced so far.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// `true` when no option has been referenced yet.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Forget every negotiated state, keeping the support declarations.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
