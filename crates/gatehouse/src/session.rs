//! The server's concrete [`Session`] type.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};

use gatehouse_protocol::PlayerId;
use gatehouse_session::{Identity, IdentitySlot, Session};
use gatehouse_transport::ConnectionId;
use tokio::sync::mpsc;

/// Locale reported until the client's handshake names one.
pub const DEFAULT_LOCALE: &str = "en_us";

/// One WebSocket client, shared between its connection task and the
/// registry.
///
/// The profile fields (`locale`, `account_id`) and the identity are
/// written once, during the handshake. Disconnect requests travel to the
/// connection task over a channel so [`Session::disconnect`] never
/// blocks.
#[derive(Debug)]
pub struct ClientSession {
    id: ConnectionId,
    peer: SocketAddr,
    identity: IdentitySlot,
    locale: OnceLock<String>,
    account_id: OnceLock<String>,
    kicks: mpsc::UnboundedSender<String>,
}

impl ClientSession {
    /// Creates a session and the receiving end of its disconnect channel.
    pub(crate) fn new(
        id: ConnectionId,
        peer: SocketAddr,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (kicks, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            peer,
            identity: IdentitySlot::new(),
            locale: OnceLock::new(),
            account_id: OnceLock::new(),
            kicks,
        });
        (session, rx)
    }

    /// Full socket address of the client, port included.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Records what the client said about itself in its handshake.
    ///
    /// Later calls are ignored.
    pub(crate) fn set_profile(&self, locale: Option<String>, account_id: Option<String>) {
        if let Some(locale) = locale.filter(|l| !l.is_empty()) {
            let _ = self.locale.set(locale.to_lowercase());
        }
        if let Some(account_id) = account_id.filter(|a| !a.is_empty()) {
            let _ = self.account_id.set(account_id);
        }
    }

    pub(crate) fn assign_identity(&self, player_id: PlayerId) -> Result<(), PlayerId> {
        self.identity.assign(player_id)
    }
}

impl Session for ClientSession {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> IpAddr {
        self.peer.ip()
    }

    fn identity(&self) -> Identity {
        self.identity.get()
    }

    fn account_id(&self) -> Option<&str> {
        self.account_id.get().map(String::as_str)
    }

    fn locale(&self) -> &str {
        self.locale.get().map_or(DEFAULT_LOCALE, String::as_str)
    }

    fn disconnect(&self, reason: String) {
        // A closed channel means the connection task is already gone.
        if self.kicks.send(reason).is_err() {
            tracing::trace!(conn_id = %self.id, "disconnect after connection task exited");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    fn session() -> (Arc<ClientSession>, mpsc::UnboundedReceiver<String>) {
        let peer = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 4), 40_000));
        ClientSession::new(ConnectionId::new(9), peer)
    }

    #[test]
    fn test_new_session_has_defaults() {
        let (s, _rx) = session();
        assert_eq!(s.connection_id(), ConnectionId::new(9));
        assert_eq!(s.address(), IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)));
        assert_eq!(s.peer_addr().port(), 40_000);
        assert_eq!(s.identity(), Identity::Unassigned);
        assert_eq!(s.locale(), DEFAULT_LOCALE);
        assert_eq!(s.account_id(), None);
    }

    #[test]
    fn test_profile_is_write_once() {
        let (s, _rx) = session();
        s.set_profile(Some("DE_de".into()), Some("acct-1".into()));
        s.set_profile(Some("fr_fr".into()), Some("acct-2".into()));
        assert_eq!(s.locale(), "de_de");
        assert_eq!(s.account_id(), Some("acct-1"));
    }

    #[test]
    fn test_empty_profile_fields_are_ignored() {
        let (s, _rx) = session();
        s.set_profile(Some(String::new()), Some(String::new()));
        assert_eq!(s.locale(), DEFAULT_LOCALE);
        assert_eq!(s.account_id(), None);
    }

    #[test]
    fn test_assign_identity_once() {
        let (s, _rx) = session();
        assert_eq!(s.assign_identity(PlayerId(1)), Ok(()));
        assert_eq!(s.assign_identity(PlayerId(2)), Err(PlayerId(1)));
        assert_eq!(s.identity(), Identity::Assigned(PlayerId(1)));
    }

    #[test]
    fn test_disconnect_queues_reason() {
        let (s, mut rx) = session();
        s.disconnect("bye".into());
        assert_eq!(rx.try_recv().unwrap(), "bye");
    }

    #[test]
    fn test_disconnect_after_receiver_dropped_is_silent() {
        let (s, rx) = session();
        drop(rx);
        s.disconnect("bye".into());
    }
}
