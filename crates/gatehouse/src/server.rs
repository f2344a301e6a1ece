//! `GatehouseServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gatehouse_protocol::{Codec, JsonCodec};
use gatehouse_session::{
    Authenticator, Localizer, Passthrough, RegistryConfig, Session, SessionRegistry,
};
use gatehouse_transport::{DEFAULT_UPGRADE_TIMEOUT, Transport, WebSocketTransport};

use crate::GatehouseError;
use crate::handler::handle_connection;
use crate::session::ClientSession;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
///
/// The registry does its own locking, so nothing here sits behind a
/// `Mutex`.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) registry: Arc<SessionRegistry<ClientSession>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) localizer: Arc<dyn Localizer>,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    /// Set once, right before the shutdown broadcast.
    pub(crate) shutdown_message: OnceLock<String>,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    pub(crate) fn new(
        registry: Arc<SessionRegistry<ClientSession>>,
        auth: A,
        codec: C,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            registry,
            auth,
            codec,
            localizer,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            shutdown_message: OnceLock::new(),
        }
    }

    /// Records the shutdown message, then asks every registered session
    /// to disconnect. Returns how many were notified.
    pub(crate) fn begin_shutdown(&self, message: &str) -> usize {
        let _ = self.shutdown_message.set(message.to_string());
        self.registry
            .broadcast_disconnect(message, self.localizer.as_ref())
    }

    /// Kicks a session that was admitted after the shutdown broadcast
    /// took its snapshot.
    ///
    /// Call after `admit_pending`. The message is stored before the
    /// snapshot is taken and the admission is visible to any snapshot
    /// taken after it, so every session is either in the snapshot or
    /// sees the message here. Some see both.
    pub(crate) fn kick_if_shutting_down(&self, session: &ClientSession) -> bool {
        let Some(message) = self.shutdown_message.get() else {
            return false;
        };
        session.disconnect(self.localizer.localize(message, session.locale()));
        true
    }
}

/// Builder for configuring and starting a Gatehouse server.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse::prelude::*;
///
/// let server = GatehouseServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_auth)
///     .await?;
/// let ctrl_c = async {
///     let _ = tokio::signal::ctrl_c().await;
/// };
/// server.run_until(ctrl_c, "gatehouse.shutdown").await
/// ```
pub struct GatehouseServerBuilder {
    bind_addr: String,
    registry_config: Option<RegistryConfig>,
    upgrade_timeout: Duration,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    localizer: Arc<dyn Localizer>,
}

impl GatehouseServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_config: None,
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            localizer: Arc::new(Passthrough),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the registry configuration.
    ///
    /// Without this, [`build`](Self::build) reads it from the environment
    /// via [`RegistryConfig::from_env`].
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = Some(config);
        self
    }

    /// How long a TCP client may take to finish the WebSocket upgrade.
    pub fn upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// How long a new connection may take to send its handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// How long an established connection may stay silent.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Translates the shutdown message into each client's locale.
    pub fn localizer(mut self, localizer: impl Localizer) -> Self {
        self.localizer = Arc::new(localizer);
        self
    }

    /// Binds the listener and returns a server ready to run.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<GatehouseServer<A, JsonCodec>, GatehouseError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_upgrade_timeout(self.upgrade_timeout);
        let config = self.registry_config.unwrap_or_else(RegistryConfig::from_env);
        tracing::info!(
            addr = %self.bind_addr,
            max_connections_per_address = config.max_connections_per_address,
            "gatehouse bound"
        );

        let mut state = ServerState::new(
            Arc::new(SessionRegistry::new(config)),
            auth,
            JsonCodec,
            self.localizer,
        );
        state.handshake_timeout = self.handshake_timeout;
        state.idle_timeout = self.idle_timeout;

        Ok(GatehouseServer {
            transport,
            state: Arc::new(state),
        })
    }
}

impl Default for GatehouseServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gatehouse server.
///
/// Call [`run`](Self::run) or [`run_until`](Self::run_until) to start
/// accepting connections.
pub struct GatehouseServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> GatehouseServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> GatehouseServerBuilder {
        GatehouseServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Handle to the live session registry.
    ///
    /// Stays valid after the server stops.
    pub fn registry(&self) -> Arc<SessionRegistry<ClientSession>> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GatehouseError> {
        self.run_until(std::future::pending::<()>(), "").await
    }

    /// Runs the accept loop until `shutdown` completes, then asks every
    /// connected client to disconnect with `message` (translated by the
    /// configured localizer) and stops listening.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
        message: &str,
    ) -> Result<(), GatehouseError> {
        tracing::info!("gatehouse running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            match handle_connection(incoming, state).await {
                                Ok(()) => {}
                                Err(GatehouseError::Transport(e)) if e.is_peer_fault() => {
                                    tracing::debug!(error = %e, "dropped connection during upgrade");
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "connection ended with error");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        let notified = self.state.begin_shutdown(message);
        self.transport.shutdown().await?;
        tracing::info!(notified, "gatehouse stopped");
        Ok(())
    }
}
