//! Error types for the session layer.

use gatehouse_protocol::PlayerId;
use gatehouse_transport::ConnectionId;

/// Errors that can occur during session management.
///
/// Admission rejection is deliberately absent: hitting the per-address
/// limit is an expected outcome and is reported as `false` from
/// [`SessionRegistry::admit_pending`](crate::SessionRegistry::admit_pending).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The session is no longer pending, usually because its connection
    /// went away while the handshake was still in flight.
    #[error("session {0} is not pending")]
    NotPending(ConnectionId),

    /// Another live session is already active under this identity.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),

    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: &'static str, value: String },
}
