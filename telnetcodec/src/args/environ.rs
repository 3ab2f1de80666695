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

//! Environment Option [RFC1408](https://tools.ietf.org/html/rfc1408) and
//! New Environment Option [RFC1572](https://tools.ietf.org/html/rfc1572)
//!
//! A payload is a command byte followed by a list of variables. Each variable
//! starts with `VAR` or `USERVAR`, carries a name, and optionally `VALUE`
//! followed by a value. `ESC` makes the next byte literal, so names and values
//! may contain the marker bytes themselves.

use crate::consts::environ;
use crate::result::SubnegotiationErrorKind;

/// ENVIRON subnegotiation command.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EnvironCommand {
    /// Variables being reported in answer to `SEND`
    Is,
    /// Request for the listed (or all) variables
    Send,
    /// Unsolicited variable change
    Info,
}

impl EnvironCommand {
    /// Command for a wire byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            environ::IS => Some(EnvironCommand::Is),
            environ::SEND => Some(EnvironCommand::Send),
            environ::INFO => Some(EnvironCommand::Info),
            _ => None,
        }
    }
}

/// Whether a variable name is well-known or user-defined.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EnvironVarKind {
    /// `VAR`
    Var,
    /// `USERVAR`
    UserVar,
}

/// One variable from an ENVIRON payload.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EnvironVar {
    /// `VAR` or `USERVAR`
    pub kind: EnvironVarKind,
    /// Unescaped variable name
    pub var: String,
    /// Unescaped value, absent when no `VALUE` marker followed the name
    pub value: Option<String>,
}

impl EnvironVar {
    /// Variable with a value.
    pub fn new(kind: EnvironVarKind, var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            var: var.into(),
            value: Some(value.into()),
        }
    }
}

fn is_var_marker(byte: u8) -> bool {
    byte == environ::VAR || byte == environ::USERVAR
}

/// Parses an ENVIRON payload.
///
/// Returns `Ok(None)` for an empty payload, which is passed through without
/// an event. A payload holding only the command byte yields an empty list.
pub fn parse(
    payload: &[u8],
) -> Result<Option<(EnvironCommand, Vec<EnvironVar>)>, SubnegotiationErrorKind> {
    let Some((&command, body)) = payload.split_first() else {
        return Ok(None);
    };
    let command = EnvironCommand::from_u8(command)
        .ok_or(SubnegotiationErrorKind::InvalidCommand { command })?;
    if body.is_empty() {
        return Ok(Some((command, Vec::new())));
    }
    if !is_var_marker(body[0]) {
        return Err(SubnegotiationErrorKind::MissingVariableType);
    }
    if body[body.len() - 1] == environ::ESC {
        return Err(SubnegotiationErrorKind::TrailingEscape);
    }

    let mut values = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let kind = match body[pos] {
            environ::USERVAR => EnvironVarKind::UserVar,
            _ => EnvironVarKind::Var,
        };
        pos += 1;

        let mut name = Vec::new();
        while pos < body.len() && !is_var_marker(body[pos]) && body[pos] != environ::VALUE {
            if body[pos] == environ::ESC {
                pos += 1;
            }
            name.push(body[pos]);
            pos += 1;
        }

        let mut value = None;
        if pos < body.len() && body[pos] == environ::VALUE {
            pos += 1;
            let mut bytes = Vec::new();
            while pos < body.len() && !is_var_marker(body[pos]) {
                if body[pos] == environ::ESC {
                    pos += 1;
                }
                bytes.push(body[pos]);
                pos += 1;
            }
            value = Some(String::from_utf8_lossy(&bytes).into_owned());
        }

        values.push(EnvironVar {
            kind,
            var: String::from_utf8_lossy(&name).into_owned(),
            value,
        });
    }
    Ok(Some((command, values)))
}
