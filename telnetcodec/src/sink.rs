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

use crate::TelnetEvent;
use std::collections::VecDeque;

/// Receiver for everything a [`crate::TelnetCodec`] reports.
///
/// Events arrive synchronously, in stream order, while the negotiator is
/// processing input or output.
pub trait EventSink {
    /// Handle one event.
    fn on_event(&mut self, event: TelnetEvent);
}

impl EventSink for Vec<TelnetEvent> {
    fn on_event(&mut self, event: TelnetEvent) {
        self.push(event);
    }
}

impl EventSink for VecDeque<TelnetEvent> {
    fn on_event(&mut self, event: TelnetEvent) {
        self.push_back(event);
    }
}

/// [`EventSink`] adapter for a closure.
///
/// ```
/// use telmux_telnetcodec::{CallbackSink, TelnetCodec, TelnetEvent};
///
/// let mut count = 0;
/// let mut codec = TelnetCodec::new();
/// codec
///     .receive(b"hello", &mut CallbackSink::new(|_event: TelnetEvent| count += 1))
///     .unwrap();
/// assert_eq!(count, 1);
/// ```
pub struct CallbackSink<F>
where
    F: FnMut(TelnetEvent),
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(TelnetEvent),
{
    /// Wrap a closure.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(TelnetEvent),
{
    fn on_event(&mut self, event: TelnetEvent) {
        (self.callback)(event);
    }
}
