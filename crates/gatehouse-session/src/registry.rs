//! The session registry: every live connection, pending or active.
//!
//! ```text
//! accept ──→ admit_pending() ──→ [pending] ──promote()──→ [active]
//!                  │                 │                        │
//!           (limit reached)          └────────remove()────────┘
//!                  ▼                              │
//!              rejected                  address slot released
//! ```
//!
//! # Concurrency
//!
//! The registry is shared as `Arc<SessionRegistry<S>>` by every
//! connection task and called without any outer lock. Both maps and the
//! address counts are `DashMap`s, so operations on unrelated sessions
//! only contend when they hash to the same shard.
//!
//! Lock order is pending → active, and only [`SessionRegistry::promote`]
//! ever holds two locks at once. A session is never visible in both maps;
//! while it is being moved it is briefly in neither, which snapshots and
//! counts may observe.
//!
//! No [`Session`] method is called while a map lock is held. Whatever the
//! registry needs to read under a lock (the active holder's connection
//! id) is captured when the session goes in.

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use gatehouse_protocol::PlayerId;
use gatehouse_transport::ConnectionId;

use crate::{
    AddressCounter, AdmissionPolicy, Identity, Localizer, RegistryConfig, Session,
    SessionError,
};

/// Tracks pending and active sessions and enforces the per-address
/// connection limit.
///
/// Construct one at server startup and hand clones of the `Arc` to every
/// component that needs it.
pub struct SessionRegistry<S: Session> {
    /// Accepted, not yet authenticated. Keyed by connection id, which is
    /// the session's reference identity.
    pending: DashMap<ConnectionId, Arc<S>>,

    /// Authenticated sessions keyed by their stable identity.
    active: DashMap<PlayerId, Held<S>>,

    /// Live sessions (pending + active) per source address.
    addresses: AddressCounter,

    policy: AdmissionPolicy,
}

/// An active session together with its connection id, read once at
/// promotion.
struct Held<S> {
    conn_id: ConnectionId,
    session: Arc<S>,
}

impl<S: Session> SessionRegistry<S> {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            pending: DashMap::new(),
            active: DashMap::new(),
            addresses: AddressCounter::new(),
            policy: config.policy(),
        }
    }

    /// Registers a freshly accepted session as pending.
    ///
    /// Returns `false` and changes nothing if the session's address is
    /// already at the limit; the caller should close the connection.
    ///
    /// # Panics
    /// If the session already carries an identity, or is already pending.
    pub fn admit_pending(&self, session: &Arc<S>) -> bool {
        let conn_id = session.connection_id();
        let addr = session.address();
        assert!(
            !session.identity().is_assigned(),
            "{conn_id} admitted after authentication"
        );

        if !self.addresses.try_acquire(addr, &self.policy) {
            tracing::warn!(
                %conn_id,
                %addr,
                limit = self.policy.max_per_address(),
                "admission rejected: too many connections from address"
            );
            return false;
        }

        let inserted = match self.pending.entry(conn_id) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(session));
                true
            }
            Entry::Occupied(_) => false,
        };
        if !inserted {
            self.addresses.release(addr);
            panic!("{conn_id} admitted twice");
        }

        tracing::debug!(%conn_id, %addr, "session admitted as pending");
        true
    }

    /// Moves a pending session into the active map under `player_id`.
    ///
    /// The session must already report `Identity::Assigned(player_id)`.
    ///
    /// # Errors
    /// - [`SessionError::NotPending`]: the session was removed (its
    ///   connection closed) before promotion; nothing is inserted.
    /// - [`SessionError::AlreadyConnected`]: another live session holds
    ///   `player_id`; this session stays pending.
    ///
    /// # Panics
    /// If the session's identity doesn't match `player_id`, or the
    /// session is already active.
    pub fn promote(&self, player_id: PlayerId, session: &Arc<S>) -> Result<(), SessionError> {
        let conn_id = session.connection_id();
        assert_eq!(
            session.identity(),
            Identity::Assigned(player_id),
            "{conn_id} promoted under {player_id} with a different identity"
        );

        let pending = match self.pending.entry(conn_id) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(entry) => {
                drop(entry);
                assert!(
                    !self.holds_active(player_id, conn_id),
                    "{conn_id} promoted twice"
                );
                return Err(SessionError::NotPending(conn_id));
            }
        };

        match self.active.entry(player_id) {
            Entry::Occupied(existing) => {
                let holder = existing.get().conn_id;
                drop(existing);
                drop(pending);
                tracing::warn!(
                    %conn_id,
                    %player_id,
                    %holder,
                    "promotion refused: identity already active"
                );
                Err(SessionError::AlreadyConnected(player_id))
            }
            Entry::Vacant(slot) => {
                // The active shard stays locked until the insert, so a
                // concurrent remove() that misses the pending entry will
                // find the session here.
                slot.insert(Held {
                    conn_id,
                    session: pending.remove(),
                });
                tracing::info!(%conn_id, %player_id, "session promoted to active");
                Ok(())
            }
        }
    }

    /// Drops a session from whichever map holds it and releases its
    /// address slot.
    ///
    /// Idempotent: returns `true` only for the call that actually removed
    /// the session. Takes `&S` so a session can remove itself from inside
    /// its own teardown.
    pub fn remove(&self, session: &S) -> bool {
        let conn_id = session.connection_id();

        // The second active check covers a promote() that moved the
        // session between the first two lookups.
        let removed = self.remove_active(session)
            || self.pending.remove(&conn_id).is_some()
            || self.remove_active(session);
        if !removed {
            tracing::debug!(%conn_id, "session already removed");
            return false;
        }

        let addr = session.address();
        if self.addresses.release(addr).is_none() {
            tracing::error!(%conn_id, %addr, "removed session had no address slot");
        }
        tracing::info!(%conn_id, %addr, identity = ?session.identity(), "session removed");
        true
    }

    fn remove_active(&self, session: &S) -> bool {
        let Identity::Assigned(player_id) = session.identity() else {
            return false;
        };
        let conn_id = session.connection_id();
        self.active
            .remove_if(&player_id, |_, held| held.conn_id == conn_id)
            .is_some()
    }

    fn holds_active(&self, player_id: PlayerId, conn_id: ConnectionId) -> bool {
        self.active
            .get(&player_id)
            .is_some_and(|held| held.conn_id == conn_id)
    }

    /// Finds an active session by its account id.
    ///
    /// Linear in the number of active sessions; this is an administrative
    /// lookup, not a hot path. Matches against a copy of the active map,
    /// so `account_id()` runs with no lock held.
    pub fn lookup_by_account_id(&self, account_id: &str) -> Option<Arc<S>> {
        self.active_sessions()
            .into_iter()
            .find(|session| session.account_id() == Some(account_id))
    }

    /// Active session for `player_id`, if any.
    pub fn get(&self, player_id: &PlayerId) -> Option<Arc<S>> {
        self.active
            .get(player_id)
            .map(|entry| Arc::clone(&entry.value().session))
    }

    fn active_sessions(&self) -> Vec<Arc<S>> {
        self.active
            .iter()
            .map(|entry| Arc::clone(&entry.value().session))
            .collect()
    }

    /// Copies out every session: pending first, then active.
    ///
    /// Not a point-in-time view across both maps; sessions admitted,
    /// promoted, or removed during the copy may or may not appear.
    pub fn snapshot_all(&self) -> Vec<Arc<S>> {
        let mut sessions = Vec::with_capacity(self.count());
        sessions.extend(self.pending.iter().map(|entry| Arc::clone(entry.value())));
        sessions.extend(self.active_sessions());
        sessions
    }

    /// Asks every session to disconnect, with `message` translated into
    /// each session's locale.
    ///
    /// Works on a snapshot and holds no lock while calling into sessions.
    /// Nothing is removed here; each session removes itself as it tears
    /// down. Returns how many sessions were notified.
    pub fn broadcast_disconnect<L>(&self, message: &str, localizer: &L) -> usize
    where
        L: Localizer + ?Sized,
    {
        let sessions = self.snapshot_all();
        tracing::info!(sessions = sessions.len(), reason = message, "broadcasting disconnect");
        for session in &sessions {
            session.disconnect(localizer.localize(message, session.locale()));
        }
        sessions.len()
    }

    /// Pending plus active sessions, counted now.
    pub fn count(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Live sessions (pending + active) from `addr`.
    pub fn connections_from(&self, addr: &IpAddr) -> usize {
        self.addresses.get(addr)
    }

    pub fn max_connections_per_address(&self) -> usize {
        self.policy.max_per_address()
    }
}

impl<S: Session> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
