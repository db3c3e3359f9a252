//! Process-wide sortable identifier generator.
//!
//! Identifiers follow the snowflake layout: milliseconds since a custom
//! epoch, a worker id derived from the configured seed, and a per-millisecond
//! sequence. They are rendered as fixed-width decimal strings so that
//! lexicographic order equals generation order.
//!
//! The generator never sleeps. If the wall clock steps backwards or the
//! sequence overflows within one millisecond, the logical timestamp is
//! advanced instead.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ids::{EventId, EventPackId};

/// Custom epoch (2025-01-01T00:00:00Z) expressed in milliseconds.
const EPOCH_MILLIS: u64 = 1_735_689_600_000;
const WORKER_ID_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest worker id that fits the layout.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Width of a rendered id; `u64::MAX` has 20 decimal digits.
const ID_WIDTH: usize = 20;

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Generates unique, lexicographically sortable ids.
///
/// One instance is created at process start and shared (behind an `Arc`)
/// by every store that needs ids.
#[derive(Debug)]
pub struct IdGenerator {
    worker_id: u16,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Create a generator whose worker id is derived from `seed`.
    pub fn from_seed(seed: &str) -> Self {
        let worker_id = u16::try_from(fnv1a(seed.as_bytes()) & u64::from(MAX_WORKER_ID))
            .unwrap_or(MAX_WORKER_ID);
        Self::with_worker_id(worker_id)
    }

    /// Create a generator with an explicit worker id (masked to the layout).
    pub fn with_worker_id(worker_id: u16) -> Self {
        Self {
            worker_id: worker_id & MAX_WORKER_ID,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// The worker id embedded in every generated id.
    pub const fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Produce the next raw 64-bit id.
    pub fn next_raw(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let now = current_millis();
        if now > state.last_timestamp {
            state.last_timestamp = now;
            state.sequence = 0;
        } else if state.sequence >= MAX_SEQUENCE {
            state.last_timestamp = state.last_timestamp.saturating_add(1);
            state.sequence = 0;
        } else {
            state.sequence = state.sequence.saturating_add(1);
        }

        let elapsed = state.last_timestamp.saturating_sub(EPOCH_MILLIS);
        (elapsed << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (u64::from(self.worker_id) << SEQUENCE_BITS)
            | state.sequence
    }

    /// Produce the next id as a fixed-width decimal string.
    pub fn next_id(&self) -> String {
        format!("{:0width$}", self.next_raw(), width = ID_WIDTH)
    }

    /// Produce the next event id.
    pub fn next_event_id(&self) -> EventId {
        EventId::new(self.next_id())
    }

    /// Produce the next event pack id.
    pub fn next_event_pack_id(&self) -> EventPackId {
        EventPackId::new(self.next_id())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_seed("seed string")
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// 64-bit FNV-1a, used only to fold the seed into a worker id.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
