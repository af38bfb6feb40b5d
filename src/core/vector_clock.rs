//! Vector clocks for causal ordering across devices.
//!
//! All functions are pure: they never mutate their inputs and return new
//! clocks. Missing components are treated as `0`, so clocks with disjoint key
//! sets compare and merge without special cases.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Map from client id to a monotonically increasing counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

/// Causal relation of one clock to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every component is equal.
    Equal,
    /// The left clock happened before the right one.
    LessThan,
    /// The left clock happened after the right one.
    GreaterThan,
    /// Neither clock dominates the other.
    Concurrent,
}

impl VectorClock {
    /// Empty clock (all components zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock with a single component, e.g. `{client: 1}` for a genesis op.
    pub fn single(client_id: impl Into<String>, counter: u64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(client_id.into(), counter);
        Self(map)
    }

    /// Counter for `client_id`, `0` when absent.
    pub fn get(&self, client_id: &str) -> u64 {
        self.0.get(client_id).copied().unwrap_or(0)
    }

    /// True when no component is above zero.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }

    /// Number of stored components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates `(client_id, counter)` pairs in client id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// See [`increment`].
    pub fn incremented(&self, client_id: &str) -> Self {
        increment(self, client_id)
    }

    /// See [`compare`].
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        compare(self, other)
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for VectorClock {
    fn from_iter<T: IntoIterator<Item = (K, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (client, counter)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{client}:{counter}")?;
        }
        f.write_str("}")
    }
}

/// Returns a copy of `clock` with `client_id`'s counter increased by one.
pub fn increment(clock: &VectorClock, client_id: &str) -> VectorClock {
    let mut next = clock.clone();
    let counter = next.0.entry(client_id.to_string()).or_insert(0);
    *counter = counter.saturating_add(1);
    next
}

/// Component-wise maximum of two clocks.
pub fn merge(a: &VectorClock, b: &VectorClock) -> VectorClock {
    let mut out = a.clone();
    for (client, counter) in &b.0 {
        let entry = out.0.entry(client.clone()).or_insert(0);
        *entry = (*entry).max(*counter);
    }
    out
}

/// Merges every clock in `clocks` into one frontier.
pub fn merge_all<'a>(clocks: impl IntoIterator<Item = &'a VectorClock>) -> VectorClock {
    clocks
        .into_iter()
        .fold(VectorClock::new(), |acc, clock| merge(&acc, clock))
}

/// Compares `a` against `b` over the union of their keys.
pub fn compare(a: &VectorClock, b: &VectorClock) -> ClockOrdering {
    let mut a_ahead = false;
    let mut b_ahead = false;

    for key in a.0.keys().chain(b.0.keys()) {
        let (av, bv) = (a.get(key), b.get(key));
        if av > bv {
            a_ahead = true;
        } else if bv > av {
            b_ahead = true;
        }
        if a_ahead && b_ahead {
            return ClockOrdering::Concurrent;
        }
    }

    match (a_ahead, b_ahead) {
        (false, false) => ClockOrdering::Equal,
        (true, false) => ClockOrdering::GreaterThan,
        (false, true) => ClockOrdering::LessThan,
        (true, true) => ClockOrdering::Concurrent,
    }
}

/// True when `current` has at least one component ahead of `reference`.
pub fn has_changes(current: &VectorClock, reference: &VectorClock) -> bool {
    current
        .0
        .iter()
        .any(|(client, counter)| *counter > reference.get(client))
}
