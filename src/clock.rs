// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use pergola::{LatticeElt, MaxDef};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lamport timestamps are plain scalars.
pub type Timestamp = u64;

/// The clock lives in the max-lattice over timestamps: the join of two
/// readings is the later one, which is the `max` half of Lamport's rule.
type ClockLE = LatticeElt<MaxDef<Timestamp>>;

/// Lamport's receive rule: `max(local, received) + 1`. Saturates at
/// `u64::MAX`, so a hostile timestamp pins the clock instead of wrapping.
pub fn merge(local: Timestamp, received: Timestamp) -> Timestamp {
    let joined = &ClockLE::new_from(local) + &ClockLE::new_from(received);
    joined.value.saturating_add(1)
}

/// Lamport's send rule: `local + 1`.
pub fn increment(local: Timestamp) -> Timestamp {
    local.saturating_add(1)
}

/// A node's logical clock. Every update is a single atomic
/// read-modify-write, so concurrent inbound messages can't lose a tick.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        LogicalClock::default()
    }

    pub fn current(&self) -> Timestamp {
        self.value.load(Ordering::SeqCst)
    }

    /// Advance for a locally originated message, returning the new value.
    pub fn increment(&self) -> Timestamp {
        self.update(increment)
    }

    /// Fold in a received timestamp, returning the new value.
    pub fn merge(&self, received: Timestamp) -> Timestamp {
        self.update(|local| merge(local, received))
    }

    fn update<F>(&self, rule: F) -> Timestamp
    where
        F: Fn(Timestamp) -> Timestamp,
    {
        // The closure never declines, so fetch_update can't return Err;
        // both arms carry the previous value.
        let prev = match self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(rule(v)))
        {
            Ok(v) | Err(v) => v,
        };
        rule(prev)
    }
}
