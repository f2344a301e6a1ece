//! Per-address admission threshold.

/// Connections allowed from one source address when nothing else is
/// configured.
pub const DEFAULT_MAX_CONNECTIONS_PER_ADDRESS: usize = 10;

/// Decides whether one more connection from an address is acceptable.
///
/// Pure: the caller supplies the current count and applies the result
/// atomically (see [`AddressCounter::try_acquire`]).
///
/// [`AddressCounter::try_acquire`]: crate::AddressCounter::try_acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    max_per_address: usize,
}

impl AdmissionPolicy {
    /// A limit of `0` rejects every connection.
    pub const fn new(max_per_address: usize) -> Self {
        Self { max_per_address }
    }

    pub fn max_per_address(&self) -> usize {
        self.max_per_address
    }

    /// `true` if an address that already has `current` live sessions
    /// may open one more.
    pub fn admits(&self, current: usize) -> bool {
        current < self.max_per_address
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTIONS_PER_ADDRESS)
    }
}
