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

//! Error types for the line multiplexer

use thiserror::Error;

/// Result type for multiplexer operations
pub type Result<T> = std::result::Result<T, MuxError>;

/// Multiplexer error types
#[derive(Debug, Error)]
pub enum MuxError {
    /// I/O error from a socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the Telnet negotiator
    #[error("Protocol error: {0}")]
    Codec(#[from] telmux_telnetcodec::CodecError),

    /// No room right now; retry after the line has drained
    #[error("Transmit stalled")]
    Stall,

    /// The line has no connection
    #[error("Connection lost")]
    Lost,

    /// Line number outside the multiplexer
    #[error("Line {0} does not exist")]
    InvalidLine(usize),

    /// Malformed argument or attach option
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unsupported line speed
    #[error("Invalid speed: {0}")]
    InvalidSpeed(String),

    /// A buffer could not be allocated
    #[error("Allocation of {requested} bytes failed")]
    AllocationFailed {
        /// Bytes that were asked for
        requested: usize,
    },

    /// Operation needs an attached multiplexer
    #[error("Multiplexer not attached")]
    NotAttached,

    /// The multiplexer is already attached
    #[error("Multiplexer already attached")]
    AlreadyAttached,
}

impl MuxError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the line usable; retrying later, or after
    /// reconnecting, may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MuxError::Stall | MuxError::Lost | MuxError::Io(_) | MuxError::AllocationFailed { .. }
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, MuxError::Lost | MuxError::Io(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        MuxError::InvalidArgument(message.into())
    }
}
