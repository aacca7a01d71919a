//! Per-key debounce bookkeeping
//!
//! The orchestrator coalesces rapid repeated events for the same key by
//! spawning a sleep that posts a fire message back onto its own channel.
//! Each trigger bumps the key's generation; a fire is only current when it
//! carries the generation of the last trigger, so superseded timers fall
//! through harmlessly. The payload of the last trigger wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Generation-counted debounce state for keys of type `K` carrying `V`
pub struct Debouncer<K, V> {
    window: Duration,
    pending: HashMap<K, (u64, V)>,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a trigger, superseding any pending one for the same key
    ///
    /// Returns the generation token the timer must carry back.
    pub fn trigger(&mut self, key: K, value: V) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending.insert(key, (generation, value));
        generation
    }

    /// Resolve a fired timer
    ///
    /// Returns the payload when the fire is current, `None` when a later
    /// trigger superseded it.
    pub fn fire(&mut self, key: &K, generation: u64) -> Option<V> {
        match self.pending.get(key) {
            Some((current, _)) if *current == generation => self.pending.remove(key).map(|(_, value)| value),
            _ => None,
        }
    }

    /// Number of keys with a pending fire
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
