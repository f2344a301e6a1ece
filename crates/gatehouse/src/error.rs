//! Unified error type for the Gatehouse server.

use std::net::IpAddr;

use gatehouse_protocol::ProtocolError;
use gatehouse_session::SessionError;
use gatehouse_transport::TransportError;

/// Top-level error that wraps the per-crate errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, duplicate identity, config).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The connection was turned away by the per-address limit.
    #[error("too many connections from {0}")]
    AdmissionRejected(IpAddr),
}
