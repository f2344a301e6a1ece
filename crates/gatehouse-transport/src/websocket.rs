//! WebSocket transport implementation using `tokio-tungstenite`.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, Incoming, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Time a peer gets to finish the HTTP upgrade after its TCP connect.
pub const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

fn ws_io(kind: ErrorKind, err: tungstenite::Error) -> io::Error {
    io::Error::new(kind, err)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// [`accept`](Transport::accept) only takes the TCP connection. The HTTP
/// upgrade runs in [`IncomingWebSocket::upgrade`], bounded by the upgrade
/// timeout, on whichever task the caller hands the peer to.
pub struct WebSocketTransport {
    listener: TcpListener,
    upgrade_timeout: Duration,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Bind to port `0` to let the OS pick a free port, then read it
    /// back with [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
            closed: AtomicBool::new(false),
        })
    }

    /// Overrides [`DEFAULT_UPGRADE_TIMEOUT`].
    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Incoming = IncomingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }

        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "accepted TCP connection");

        Ok(IncomingWebSocket {
            id,
            peer,
            stream,
            upgrade_timeout: self.upgrade_timeout,
        })
    }

    /// Stops handing out connections. Already accepted connections are
    /// not touched.
    async fn shutdown(&self) -> Result<(), Self::Error> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("WebSocket transport shut down");
        }
        Ok(())
    }
}

/// A TCP peer that hasn't sent its WebSocket upgrade request yet.
///
/// Dropping it closes the socket.
pub struct IncomingWebSocket {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    upgrade_timeout: Duration,
}

impl Incoming for IncomingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn upgrade(self) -> Result<Self::Connection, Self::Error> {
        let Self {
            id,
            peer,
            stream,
            upgrade_timeout,
        } = self;

        let ws = match tokio::time::timeout(
            upgrade_timeout,
            tokio_tungstenite::accept_async(stream),
        )
        .await
        {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(TransportError::UpgradeFailed {
                    peer,
                    source: ws_io(ErrorKind::InvalidData, e),
                });
            }
            Err(_) => return Err(TransportError::UpgradeTimedOut(peer)),
        };
        tracing::debug!(%id, %peer, "upgraded to WebSocket");

        Ok(WebSocketConnection {
            id,
            peer,
            ws: Mutex::new(ws),
        })
    }
}

/// A single upgraded WebSocket connection.
///
/// Frames go out as binary. Incoming text frames are passed through as
/// their UTF-8 bytes; pings and pongs are handled by tungstenite and
/// never surface.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    ws: Mutex<WsStream>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.ws
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(ws_io(ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut ws = self.ws.lock().await;
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Binary(data)) => return Ok(Some(data.into())),
                Ok(Message::Text(text)) => return Ok(Some(text.as_bytes().to_vec())),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(e) => {
                    return Err(TransportError::ReceiveFailed(ws_io(
                        ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.ws
            .lock()
            .await
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(ws_io(ErrorKind::BrokenPipe, e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
