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

//! Terminal Type [RFC1091](https://tools.ietf.org/html/rfc1091)
//!

use crate::consts::ttype;
use crate::result::SubnegotiationErrorKind;
use std::fmt::Formatter;

/// TERMINAL-TYPE subnegotiation command.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TerminalTypeCommand {
    /// The payload carries the sender's terminal name
    Is,
    /// The sender asks for the receiver's terminal name
    Send,
}

impl TerminalTypeCommand {
    /// Wire byte of the command.
    pub fn to_u8(self) -> u8 {
        match self {
            TerminalTypeCommand::Is => ttype::IS,
            TerminalTypeCommand::Send => ttype::SEND,
        }
    }
}

impl std::fmt::Display for TerminalTypeCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalTypeCommand::Is => write!(f, "IS"),
            TerminalTypeCommand::Send => write!(f, "SEND"),
        }
    }
}

/// Parses a TERMINAL-TYPE payload into its command and, for `IS`, the name.
///
/// An empty payload or an unknown command byte is an error.
pub fn parse(
    payload: &[u8],
) -> Result<(TerminalTypeCommand, Option<String>), SubnegotiationErrorKind> {
    let Some((&command, rest)) = payload.split_first() else {
        return Err(SubnegotiationErrorKind::IncompleteData {
            description: "TERMINAL-TYPE request",
        });
    };
    match command {
        ttype::IS => Ok((
            TerminalTypeCommand::Is,
            Some(String::from_utf8_lossy(rest).into_owned()),
        )),
        ttype::SEND => Ok((TerminalTypeCommand::Send, None)),
        command => Err(SubnegotiationErrorKind::InvalidCommand { command }),
    }
}
