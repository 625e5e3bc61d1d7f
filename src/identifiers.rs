//! Type-safe identifiers.
//!
//! Connection identities are allocated from a process-wide counter and are
//! never reused, so a torn-down connection can never alias a new one in the
//! registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Constants
// ============================================================================

/// Next connection ID to hand out. Starts at 1 so IDs fit `NonZeroU64`.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ConnectionId
// ============================================================================

/// Process-unique identity of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Allocates a fresh connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1 and would need 2^64 allocations to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Wraps a raw value. Returns `None` for 0.
    #[inline]
    #[must_use]
    pub fn from_u64(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
