//! Wire protocol for Gatehouse.
//!
//! Only the control plane lives here: the handshake a client sends to
//! get admitted and promoted, heartbeats, disconnect notices, and
//! errors. Whatever the connection carries after the handshake belongs
//! to the application and is not interpreted by this crate.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session registry
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Envelope, PlayerId, SystemMessage, error_codes};
