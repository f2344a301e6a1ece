use std::io;
use std::net::SocketAddr;

/// Errors that can occur in the transport layer.
///
/// Upgrade failures are attributed to the peer that caused them, so the
/// accept loop can log them and move on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("bind failed: {0}")]
    BindFailed(#[source] io::Error),

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// The peer connected but did not complete a valid WebSocket upgrade.
    #[error("websocket upgrade from {peer} failed: {source}")]
    UpgradeFailed {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The peer connected but never finished the WebSocket upgrade.
    #[error("websocket upgrade from {0} timed out")]
    UpgradeTimedOut(SocketAddr),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The transport was shut down and accepts nothing more.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// True for failures caused by a single misbehaving peer rather than
    /// by the listener itself.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, Self::UpgradeFailed { .. } | Self::UpgradeTimedOut(_))
    }
}
