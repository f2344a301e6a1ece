//! # Gatehouse
//!
//! WebSocket front door for a multiplayer server.
//!
//! Gatehouse accepts client connections, limits how many each source
//! address may hold open, runs a small versioned handshake, hands the
//! client's token to your [`Authenticator`], and keeps every live
//! connection in a concurrent [`SessionRegistry`] that the rest of your
//! server can query or broadcast to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehouse::prelude::*;
//!
//! struct DevAuth;
//!
//! impl Authenticator for DevAuth {
//!     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
//!         token
//!             .parse()
//!             .map(PlayerId)
//!             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))
//!     }
//! }
//!
//! # async fn start() -> Result<(), GatehouseError> {
//! init_tracing();
//! let server = GatehouseServer::<DevAuth, JsonCodec>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(DevAuth)
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! [`Authenticator`]: gatehouse_session::Authenticator
//! [`SessionRegistry`]: gatehouse_session::SessionRegistry

mod error;
mod handler;
mod logging;
mod server;
mod session;

pub use error::GatehouseError;
pub use logging::init_tracing;
pub use server::{GatehouseServer, GatehouseServerBuilder, PROTOCOL_VERSION};
pub use session::{ClientSession, DEFAULT_LOCALE};

pub mod prelude {
    //! Everything needed to run a server and talk to its registry.

    pub use crate::{
        ClientSession, DEFAULT_LOCALE, GatehouseError, GatehouseServer, GatehouseServerBuilder,
        PROTOCOL_VERSION, init_tracing,
    };
    pub use gatehouse_protocol::{
        Codec, Envelope, JsonCodec, PlayerId, ProtocolError, SystemMessage, error_codes,
    };
    pub use gatehouse_session::{
        Authenticator, Identity, LocaleTable, Localizer, Passthrough, RegistryConfig, Session,
        SessionError, SessionRegistry,
    };
    pub use gatehouse_transport::{ConnectionId, TransportError};
}
