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

//! Time and check-order sources the multiplexer depends on

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock backed [`Clock`].
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced [`Clock`]; clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Decides, per line and per poll, whether a pending outbound connection is
/// checked before the line's listener.
///
/// Two multiplexers dialing each other must not both keep seeing their own
/// outbound attempt first, so the production order is random.
pub trait CheckOrder: Send {
    /// `true` to check the outbound connection first.
    fn outbound_first(&mut self, line: usize) -> bool;
}

/// Coin-flip [`CheckOrder`].
pub struct RandomOrder {
    rng: StdRng,
}

impl RandomOrder {
    /// Seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomOrder").finish_non_exhaustive()
    }
}

impl CheckOrder for RandomOrder {
    fn outbound_first(&mut self, _line: usize) -> bool {
        self.rng.random_bool(0.5)
    }
}

/// Always the same [`CheckOrder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedOrder {
    /// Value returned for every line
    pub outbound_first: bool,
}

impl CheckOrder for FixedOrder {
    fn outbound_first(&mut self, _line: usize) -> bool {
        self.outbound_first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::default();
        let first = clock.now();
        assert!(clock.now() >= first);
    }

    #[test]
    fn test_seeded_order_is_reproducible() {
        let mut a = RandomOrder::seeded(7);
        let mut b = RandomOrder::seeded(7);
        let left: Vec<bool> = (0..32).map(|line| a.outbound_first(line)).collect();
        let right: Vec<bool> = (0..32).map(|line| b.outbound_first(line)).collect();
        assert_eq!(left, right);
        assert!(left.contains(&true) && left.contains(&false));
    }

    #[test]
    fn test_fixed_order() {
        let mut order = FixedOrder {
            outbound_first: true,
        };
        assert!(order.outbound_first(0));
        assert!(order.outbound_first(9));
    }
}
