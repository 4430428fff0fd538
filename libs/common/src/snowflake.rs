use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z in milliseconds since Unix epoch.
const MINGLE_EPOCH_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Default)]
struct Clock {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit, time-ordered message id generator.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the Mingle epoch
/// - Bits 21–12: Worker ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter
///
/// Ids from one generator are strictly increasing, so sorting by id matches
/// the order in which the server accepted the messages.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<Clock>,
}

impl SnowflakeGenerator {
    /// Worker ids above 1023 are masked into range.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id & MAX_WORKER_ID),
            clock: Mutex::new(Clock::default()),
        }
    }

    pub fn generate(&self) -> i64 {
        // The critical section cannot panic, so a poisoned lock still holds a valid clock.
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);

        // A wall clock that steps backwards keeps issuing from the last timestamp.
        let mut now_ms = current_ms().max(clock.last_ms);

        if now_ms == clock.last_ms {
            clock.sequence = (clock.sequence + 1) & SEQUENCE_MASK;
            if clock.sequence == 0 {
                // Sequence exhausted for this millisecond: borrow the next one.
                now_ms += 1;
            }
        } else {
            clock.sequence = 0;
        }
        clock.last_ms = now_ms;

        let ts = now_ms.saturating_sub(MINGLE_EPOCH_MS);
        let id = (ts << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | clock.sequence;

        id as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(MINGLE_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    ((id as u64) >> (WORKER_BITS + SEQUENCE_BITS)) + MINGLE_EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_increasing() {
        let gen = SnowflakeGenerator::new(3);
        let mut seen = HashSet::new();
        let mut prev = 0i64;
        for _ in 0..10_000 {
            let id = gen.generate();
            assert!(id > prev, "not monotonic: {prev} >= {id}");
            assert!(seen.insert(id), "duplicate snowflake: {id}");
            prev = id;
        }
    }

    #[test]
    fn timestamp_is_recoverable() {
        let gen = SnowflakeGenerator::new(0);
        let before = current_ms();
        let id = gen.generate();

        // Sequence overflow may push the embedded timestamp a few ms ahead.
        let extracted = snowflake_timestamp_ms(id);
        assert!(extracted >= before, "extracted={extracted}, before={before}");
        assert!(extracted <= current_ms() + 5);
    }

    #[test]
    fn worker_id_is_embedded() {
        let gen = SnowflakeGenerator::new(7);
        let id = gen.generate() as u64;
        assert_eq!((id >> SEQUENCE_BITS) & u64::from(MAX_WORKER_ID), 7);
    }

    #[test]
    fn backwards_clock_does_not_panic() {
        let gen = SnowflakeGenerator::new(0);
        let first = gen.generate();
        {
            let mut clock = gen.clock.lock().unwrap();
            clock.last_ms += 60_000;
        }
        let second = gen.generate();
        assert!(second > first);
    }
}
