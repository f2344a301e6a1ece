//! The registry's view of a connection.
//!
//! The registry never looks inside a session's protocol state. All it
//! needs is a handful of accessors and a way to ask the session to shut
//! itself down; the accept layer supplies the concrete type.

use std::net::IpAddr;
use std::sync::OnceLock;

use gatehouse_protocol::PlayerId;
use gatehouse_transport::ConnectionId;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Whether a session has been bound to a stable player identity.
///
/// ```text
///   Unassigned ──(authenticated)──→ Assigned(PlayerId)
/// ```
///
/// There is no transition back. Only `Assigned` sessions may be
/// promoted into the active map, and the registry checks that the
/// identity it is asked to promote under matches this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    /// Accepted but not yet authenticated.
    #[default]
    Unassigned,

    /// Authenticated as the given player.
    Assigned(PlayerId),
}

impl Identity {
    /// Returns the player id if one has been assigned.
    pub fn player_id(self) -> Option<PlayerId> {
        match self {
            Self::Assigned(id) => Some(id),
            Self::Unassigned => None,
        }
    }

    pub fn is_assigned(self) -> bool {
        matches!(self, Self::Assigned(_))
    }
}

/// Write-once storage for a session's [`Identity`].
///
/// Lets a session type shared behind `Arc` accept its identity exactly
/// once without a lock.
#[derive(Debug, Default)]
pub struct IdentitySlot(OnceLock<PlayerId>);

impl IdentitySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the slot to `player_id`.
    ///
    /// # Errors
    /// Returns the identity that was already assigned if the slot is
    /// taken. The slot is never overwritten.
    pub fn assign(&self, player_id: PlayerId) -> Result<(), PlayerId> {
        self.0
            .set(player_id)
            .map_err(|rejected| self.0.get().copied().unwrap_or(rejected))
    }

    pub fn get(&self) -> Identity {
        match self.0.get() {
            Some(id) => Identity::Assigned(*id),
            None => Identity::Unassigned,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A client connection as seen by the [`SessionRegistry`].
///
/// Implementations are shared as `Arc<Self>` between the connection task
/// that owns them and the registry, so every method takes `&self`.
///
/// The registry never calls these methods while holding one of its own
/// locks, so an implementation may read the registry from inside them.
/// Accessors should still be cheap: `lookup_by_account_id` calls
/// `account_id` once per active session.
///
/// [`SessionRegistry`]: crate::SessionRegistry
pub trait Session: Send + Sync + 'static {
    /// Reference identity of this session. Two live sessions never share
    /// a connection id.
    fn connection_id(&self) -> ConnectionId;

    /// Source address the connection came from. Must not change over
    /// the session's lifetime; admission counts are keyed on it.
    fn address(&self) -> IpAddr;

    /// Stable identity, once authenticated. Must never change after it
    /// first reports `Assigned`.
    fn identity(&self) -> Identity;

    /// Secondary lookup key (a platform account id), if the client
    /// supplied one.
    fn account_id(&self) -> Option<&str>;

    /// Locale tag used to translate server-initiated text.
    fn locale(&self) -> &str;

    /// Asks the session to close with the given, already localized,
    /// reason.
    ///
    /// Must not block: the registry calls this in a loop over every
    /// session during a broadcast. The session is expected to call
    /// [`SessionRegistry::remove`](crate::SessionRegistry::remove) on
    /// itself as part of its own teardown.
    fn disconnect(&self, reason: String);
}
