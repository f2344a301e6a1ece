//! Test session shared by the registry integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use gatehouse_protocol::PlayerId;
use gatehouse_session::{Identity, IdentitySlot, Session, SessionRegistry};
use gatehouse_transport::ConnectionId;

pub struct TestSession {
    pub id: ConnectionId,
    pub addr: IpAddr,
    pub identity: IdentitySlot,
    pub account_id: Option<String>,
    pub disconnects: AtomicUsize,
    /// When set, `disconnect` removes the session from this registry,
    /// the way a real connection task does on teardown.
    pub registry: OnceLock<Weak<SessionRegistry<TestSession>>>,
}

impl TestSession {
    pub fn new(id: u64, addr: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            addr,
            identity: IdentitySlot::new(),
            account_id: Some(format!("acct-{id}")),
            disconnects: AtomicUsize::new(0),
            registry: OnceLock::new(),
        })
    }

    /// Assigns `player` as identity; panics if already assigned.
    pub fn authenticate(&self, player: u64) -> PlayerId {
        let id = PlayerId(player);
        self.identity.assign(id).expect("fresh session");
        id
    }
}

impl Session for TestSession {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> IpAddr {
        self.addr
    }

    fn identity(&self) -> Identity {
        self.identity.get()
    }

    fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    fn locale(&self) -> &str {
        "en_us"
    }

    fn disconnect(&self, _reason: String) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
            registry.remove(self);
        }
    }
}

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
}
