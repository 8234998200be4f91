//! Fingerprint: content hash used to match a greeting to its metadata.
//!
//! Uses the 31-multiplier string hash over UTF-16 code units with 32-bit
//! wrap-around. The value fits in an `i32`, so it survives a round-trip through
//! a JSON number written by any host that uses the same hash.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Deterministic, order-sensitive hash of a greeting's exact text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(i64);

impl Fingerprint {
    /// Fingerprint of the empty string.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    /// Compute the fingerprint of `text`.
    pub fn of(text: &str) -> Self {
        let mut hash: i32 = 0;
        for unit in text.encode_utf16() {
            hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
        }
        Self(hash as i64)
    }

    /// Wrap a value read from a persisted document.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shorthand for [`Fingerprint::of`].
pub fn fingerprint(text: &str) -> Fingerprint {
    Fingerprint::of(text)
}
