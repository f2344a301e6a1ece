//! Per-connection handler: admission, handshake, and the control loop.
//!
//! Each accepted TCP peer gets its own Tokio task running this handler.
//! The flow is:
//!   1. Admit as pending on the peer's address, before any upgrade work
//!   2. Upgrade to WebSocket (bounded); if not admitted, answer 429 and close
//!   3. Receive Handshake → validate version → authenticate → promote
//!   4. Loop: heartbeats, client disconnects, server kicks

use std::sync::Arc;
use std::time::{Duration, Instant};

use gatehouse_protocol::{Codec, Envelope, PlayerId, ProtocolError, SystemMessage, error_codes};
use gatehouse_session::{Authenticator, Session, SessionError, SessionRegistry};
use gatehouse_transport::{Connection, Incoming, IncomingWebSocket, WebSocketConnection};
use tokio::sync::mpsc;

use crate::GatehouseError;
use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::session::ClientSession;

/// Drop guard that removes the session from the registry when the
/// handler exits, however it exits.
///
/// `remove` is synchronous and idempotent, so this runs inline.
struct SessionGuard {
    session: Arc<ClientSession>,
    registry: Arc<SessionRegistry<ClientSession>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.session);
    }
}

/// What the next wait on a connection produced.
enum Inbound {
    Frame(Vec<u8>),
    Closed,
    TimedOut,
    Kicked(String),
}

/// Outgoing sequence numbers and timestamps for one connection.
struct Outbox<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<'a, C: Codec> Outbox<'a, C> {
    fn new(conn: &'a WebSocketConnection, codec: &'a C) -> Self {
        Self {
            conn,
            codec,
            seq: 0,
            start: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(&mut self, message: SystemMessage) -> Result<(), GatehouseError> {
        let envelope = Envelope::new(self.seq, self.elapsed_ms(), message);
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&mut self, code: u16, message: &str) -> Result<(), GatehouseError> {
        self.send(SystemMessage::Error {
            code,
            message: message.to_string(),
        })
        .await
    }

    /// Tells the client why it is being dropped, then closes the socket.
    async fn kick(&mut self, reason: String) -> Result<(), GatehouseError> {
        self.send(SystemMessage::Disconnect { reason }).await?;
        self.conn.close().await?;
        Ok(())
    }
}

/// Handles a single connection from TCP accept to close.
pub(crate) async fn handle_connection<A, C>(
    incoming: IncomingWebSocket,
    state: Arc<ServerState<A, C>>,
) -> Result<(), GatehouseError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = incoming.id();
    let peer = incoming.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    let (session, mut kicks) = ClientSession::new(conn_id, peer);

    // --- Step 1: Admission ---
    // Counted before the upgrade, so half-open peers use up their
    // address's slots too.
    let admitted = state.registry.admit_pending(&session);
    let _guard = admitted.then(|| SessionGuard {
        session: Arc::clone(&session),
        registry: Arc::clone(&state.registry),
    });
    if admitted && state.kick_if_shutting_down(&session) {
        tracing::debug!(%conn_id, "admitted during shutdown");
    }

    // --- Step 2: Upgrade ---
    let conn = incoming.upgrade().await?;
    let mut out = Outbox::new(&conn, &state.codec);

    if !admitted {
        out.send_error(
            error_codes::TOO_MANY_CONNECTIONS,
            "too many connections from your address",
        )
        .await?;
        let _ = conn.close().await;
        return Err(GatehouseError::AdmissionRejected(peer.ip()));
    }

    // --- Step 3: Handshake ---
    let Some(player_id) = perform_handshake(&mut out, &state, &session, &mut kicks).await? else {
        return Ok(());
    };
    tracing::info!(%conn_id, %player_id, "player connected");

    // --- Step 4: Control loop ---
    loop {
        let data = match next_inbound(&conn, &mut kicks, state.idle_timeout).await? {
            Inbound::Frame(data) => data,
            Inbound::Closed => {
                tracing::info!(%player_id, "connection closed cleanly");
                break;
            }
            Inbound::TimedOut => {
                tracing::info!(%player_id, "connection timed out");
                break;
            }
            Inbound::Kicked(reason) => {
                tracing::info!(%player_id, %reason, "disconnecting player");
                out.kick(reason).await?;
                return Ok(());
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                continue;
            }
        };

        match envelope.message {
            SystemMessage::Heartbeat { client_time } => {
                let server_time = out.elapsed_ms();
                out.send(SystemMessage::HeartbeatAck {
                    client_time,
                    server_time,
                })
                .await?;
            }
            SystemMessage::Disconnect { reason } => {
                tracing::info!(%player_id, %reason, "client disconnected");
                break;
            }
            _ => {
                tracing::debug!(%player_id, "ignoring unexpected system message");
            }
        }
    }

    let _ = conn.close().await;
    // _guard drops here → session leaves the registry.
    Ok(())
}

/// Receives the handshake, authenticates, and promotes the session.
///
/// Returns `Ok(None)` if the connection ended or was kicked before the
/// handshake completed.
async fn perform_handshake<A, C>(
    out: &mut Outbox<'_, C>,
    state: &ServerState<A, C>,
    session: &Arc<ClientSession>,
    kicks: &mut mpsc::UnboundedReceiver<String>,
) -> Result<Option<PlayerId>, GatehouseError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match next_inbound(out.conn, kicks, state.handshake_timeout).await? {
        Inbound::Frame(data) => data,
        Inbound::Closed => {
            tracing::debug!(conn_id = %session.connection_id(), "closed before handshake");
            return Ok(None);
        }
        Inbound::TimedOut => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
        Inbound::Kicked(reason) => {
            out.kick(reason).await?;
            return Ok(None);
        }
    };

    let message = match state.codec.decode::<Envelope>(&data) {
        Ok(envelope) => envelope.message,
        Err(e) => {
            out.send_error(error_codes::BAD_HANDSHAKE, "expected Handshake")
                .await?;
            return Err(e.into());
        }
    };

    let SystemMessage::Handshake {
        version,
        token,
        locale,
        account_id,
    } = message
    else {
        out.send_error(error_codes::BAD_HANDSHAKE, "expected Handshake")
            .await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        out.send_error(
            error_codes::BAD_HANDSHAKE,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    session.set_profile(locale, account_id);

    let player_id = match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(pid) => pid,
        Err(e) => {
            out.send_error(error_codes::UNAUTHORIZED, "unauthorized")
                .await?;
            return Err(e.into());
        }
    };

    if let Err(existing) = session.assign_identity(player_id) {
        return Err(ProtocolError::InvalidMessage(format!(
            "session already authenticated as {existing}"
        ))
        .into());
    }

    match state.registry.promote(player_id, session) {
        Ok(()) => {}
        Err(e @ SessionError::AlreadyConnected(_)) => {
            out.send_error(error_codes::ALREADY_CONNECTED, "already connected")
                .await?;
            return Err(e.into());
        }
        // Removed from the registry while authenticating.
        Err(e) => return Err(e.into()),
    }

    let server_time = out.elapsed_ms();
    out.send(SystemMessage::HandshakeAck {
        player_id,
        server_time,
    })
    .await?;

    Ok(Some(player_id))
}

/// Waits for the next frame, a server-side kick, or the timeout,
/// whichever comes first.
async fn next_inbound(
    conn: &WebSocketConnection,
    kicks: &mut mpsc::UnboundedReceiver<String>,
    timeout: Duration,
) -> Result<Inbound, GatehouseError> {
    tokio::select! {
        kick = kicks.recv() => Ok(kick.map_or(Inbound::Closed, Inbound::Kicked)),
        received = tokio::time::timeout(timeout, conn.recv()) => match received {
            Ok(Ok(Some(data))) => Ok(Inbound::Frame(data)),
            Ok(Ok(None)) => Ok(Inbound::Closed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(Inbound::TimedOut),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use gatehouse_protocol::JsonCodec;
    use gatehouse_session::{LocaleTable, RegistryConfig};
    use gatehouse_transport::{ConnectionId, Transport, WebSocketTransport};

    use super::*;

    struct RejectAll;

    impl Authenticator for RejectAll {
        async fn authenticate(&self, _token: &str) -> Result<PlayerId, SessionError> {
            Err(SessionError::AuthFailed("closed".into()))
        }
    }

    fn state() -> Arc<ServerState<RejectAll, JsonCodec>> {
        let localizer = LocaleTable::new("en_us").with(
            "en_us",
            "gatehouse.shutdown",
            "Server is shutting down",
        );
        Arc::new(ServerState::new(
            Arc::new(SessionRegistry::new(RegistryConfig::default())),
            RejectAll,
            JsonCodec,
            Arc::new(localizer),
        ))
    }

    #[tokio::test]
    async fn test_handle_connection_admitted_after_broadcast_is_kicked() {
        let state = state();
        // The broadcast has already run; this peer was not in its snapshot.
        assert_eq!(state.begin_shutdown("gatehouse.shutdown"), 0);

        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let client = tokio::spawn(async move {
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .unwrap()
                .0
        });
        let incoming = transport.accept().await.unwrap();
        let handler = tokio::spawn(handle_connection(incoming, Arc::clone(&state)));
        let mut ws = client.await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("kicked promptly")
            .unwrap()
            .unwrap();
        let envelope: Envelope = serde_json::from_slice(&frame.into_data()).unwrap();
        assert_eq!(
            envelope.message,
            SystemMessage::Disconnect {
                reason: "Server is shutting down".into()
            }
        );

        handler.await.unwrap().unwrap();
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_kick_if_shutting_down_before_shutdown_does_nothing() {
        let state = state();
        let peer = "127.0.0.1:4000".parse().unwrap();
        let (session, mut kicks) = ClientSession::new(ConnectionId::new(1), peer);

        assert!(!state.kick_if_shutting_down(&session));
        assert!(kicks.try_recv().is_err());

        state.begin_shutdown("gatehouse.shutdown");
        assert!(state.kick_if_shutting_down(&session));
        assert_eq!(kicks.try_recv().unwrap(), "Server is shutting down");
    }
}
