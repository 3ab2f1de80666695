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

use crate::TelnetOption;

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Problems found while negotiating or decoding a Telnet stream.
///
/// Protocol problems are reported inline as [`crate::TelnetEvent::Warning`] or
/// [`crate::TelnetEvent::Error`] and never interrupt the stream. Only resource
/// and I/O failures are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An I/O error occurred while reading from or writing to the underlying stream.
    IOError {
        /// The kind of I/O error that occurred
        kind: std::io::ErrorKind,
        /// Description of the operation that failed
        operation: String,
    },

    /// The peer answered a request in a way RFC 1143 calls a protocol error,
    /// such as `DONT` answered by `WILL`.
    NegotiationConflict {
        /// Option being negotiated
        option: TelnetOption,
        /// Short description of the conflict
        reason: &'static str,
    },

    /// A byte other than `SE` or `IAC` followed `IAC` inside a subnegotiation.
    UnexpectedByteInSubnegotiation(u8),

    /// A subnegotiation payload outgrew the largest buffer tier and was discarded.
    SubnegotiationOverflow {
        /// Option whose payload overflowed
        option: TelnetOption,
        /// Largest permitted payload size
        limit: usize,
    },

    /// A subnegotiation payload could not be parsed.
    SubnegotiationError {
        /// The telnet option being subnegotiated
        option: TelnetOption,
        /// Specific reason for the failure
        reason: SubnegotiationErrorKind,
    },

    /// A buffer could not be grown to the requested size.
    AllocationFailed {
        /// Number of bytes requested
        requested: usize,
    },
}

/// Specific kinds of subnegotiation errors with structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnegotiationErrorKind {
    /// The payload stopped before a required byte.
    IncompleteData {
        /// Description of what data is incomplete
        description: &'static str,
    },

    /// Invalid command byte in the subnegotiation data.
    InvalidCommand {
        /// The invalid command byte
        command: u8,
    },

    /// An ENVIRON payload does not start with `VAR` or `USERVAR`.
    MissingVariableType,

    /// An ENVIRON payload ends inside an `ESC` sequence.
    TrailingEscape,
}

impl CodecError {
    /// Whether the error is an [`CodecError::AllocationFailed`].
    pub fn is_resource_error(&self) -> bool {
        matches!(self, CodecError::AllocationFailed { .. })
    }
}

impl std::error::Error for CodecError {}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::IOError { kind, operation } => {
                write!(f, "I/O error during {}: {:?}", operation, kind)
            }
            CodecError::NegotiationConflict { option, reason } => {
                write!(f, "Negotiation error for option {}: {}", option, reason)
            }
            CodecError::UnexpectedByteInSubnegotiation(byte) => {
                write!(f, "unexpected byte after IAC inside SB: {}", byte)
            }
            CodecError::SubnegotiationOverflow { option, limit } => {
                write!(
                    f,
                    "subnegotiation buffer size limit of {} bytes reached for option {}",
                    limit, option
                )
            }
            CodecError::SubnegotiationError { option, reason } => {
                write!(f, "Subnegotiation error for option {}: {}", option, reason)
            }
            CodecError::AllocationFailed { requested } => {
                write!(f, "failed to allocate {} bytes", requested)
            }
        }
    }
}

impl std::fmt::Display for SubnegotiationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnegotiationErrorKind::IncompleteData { description } => {
                write!(f, "incomplete {}", description)
            }
            SubnegotiationErrorKind::InvalidCommand { command } => {
                write!(f, "invalid command: {}", command)
            }
            SubnegotiationErrorKind::MissingVariableType => {
                write!(f, "missing variable type")
            }
            SubnegotiationErrorKind::TrailingEscape => write!(f, "ends with ESC"),
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::IOError {
            kind: err.kind(),
            operation: err.to_string(),
        }
    }
}
