use std::sync::{
    atomic::{AtomicI64, Ordering},
    Mutex,
};

use lazy_static::lazy_static;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use regex::Regex;
use time::OffsetDateTime;

const FIRST_NAMES: [&str; 10] = [
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack",
];
const LAST_NAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez",
];

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Picks "First Last" display names from fixed lists.
///
/// One generator lives for the whole process and is seeded once; tests seed
/// it explicitly to get a reproducible sequence.
pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn next_name(&self) -> String {
        // a poisoned lock still holds a usable rng
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let first = FIRST_NAMES.choose(&mut *rng).copied().unwrap_or(FIRST_NAMES[0]);
        let last = LAST_NAMES.choose(&mut *rng).copied().unwrap_or(LAST_NAMES[0]);
        format!("{first} {last}")
    }
}

/// Produces `user-<nanos>@example.com`, where `<nanos>` never repeats within
/// the process even when the clock does not advance between calls.
pub struct EmailGenerator {
    last: AtomicI64,
}

impl EmailGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
        }
    }

    pub fn next_email(&self) -> String {
        self.next_email_at(clamp_nanos(OffsetDateTime::now_utc().unix_timestamp_nanos()))
    }

    fn next_email_at(&self, now: i64) -> String {
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|v| v);
        let stamp = now.max(prev.saturating_add(1));
        format!("user-{stamp}@example.com")
    }
}

/// i64 nanoseconds cover 1677..2262; anything outside saturates.
fn clamp_nanos(nanos: i128) -> i64 {
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}

impl Default for EmailGenerator {
    fn default() -> Self {
        Self::new()
    }
}
