//! Live connection counts per source address.

use std::net::IpAddr;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::AdmissionPolicy;

/// Concurrent `IpAddr → count` map.
///
/// Every read-modify-write of one address happens under that address's
/// shard lock, so concurrent acquires and releases for the same address
/// are linearized and never lose an update. Addresses whose count drops
/// to zero are removed, so the map only holds addresses with live
/// connections.
#[derive(Debug, Default)]
pub struct AddressCounter {
    counts: DashMap<IpAddr, usize>,
}

impl AddressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one connection slot for `addr` if `policy` allows it.
    ///
    /// The limit check and the increment are a single atomic step, so
    /// a burst of simultaneous connections can never push an address
    /// past the limit.
    pub fn try_acquire(&self, addr: IpAddr, policy: &AdmissionPolicy) -> bool {
        match self.counts.entry(addr) {
            Entry::Occupied(mut entry) => {
                if !policy.admits(*entry.get()) {
                    return false;
                }
                *entry.get_mut() += 1;
                true
            }
            Entry::Vacant(entry) => {
                if !policy.admits(0) {
                    return false;
                }
                entry.insert(1);
                true
            }
        }
    }

    /// Gives back one slot for `addr`.
    ///
    /// Returns the remaining count, or `None` if `addr` had no live
    /// connections (nothing is changed in that case).
    pub fn release(&self, addr: IpAddr) -> Option<usize> {
        match self.counts.entry(addr) {
            Entry::Occupied(mut entry) => {
                let count = entry.get_mut();
                *count = count.saturating_sub(1);
                let remaining = *count;
                if remaining == 0 {
                    entry.remove();
                }
                Some(remaining)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Live connections from `addr`; `0` if it has none.
    pub fn get(&self, addr: &IpAddr) -> usize {
        self.counts.get(addr).map(|count| *count).unwrap_or(0)
    }

    /// Number of distinct addresses with at least one live connection.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
