//! Connection and session registry for Gatehouse.
//!
//! This crate tracks every client connection through its lifecycle:
//!
//! 1. **Admission**: a freshly accepted connection is registered as
//!    *pending*, unless its source address already has too many live
//!    connections ([`AdmissionPolicy`], [`AddressCounter`]).
//! 2. **Promotion**: once the [`Authenticator`] accepts the client, the
//!    pending session becomes *active* under a stable [`PlayerId`].
//! 3. **Removal**: on disconnect the session leaves whichever state it
//!    is in and gives back its address slot.
//!
//! All of it lives in [`SessionRegistry`], which is safe to call from
//! every connection task at once without an outer lock.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)        ← accept loop, per-connection handler
//!     ↕
//! Session registry      ← this crate
//!     ↕
//! Protocol / Transport  ← PlayerId, ConnectionId
//! ```
//!
//! [`PlayerId`]: gatehouse_protocol::PlayerId

#![allow(async_fn_in_trait)]

mod address;
mod auth;
mod config;
mod error;
mod locale;
mod policy;
mod registry;
mod session;

pub use address::AddressCounter;
pub use auth::Authenticator;
pub use config::{MAX_CONNECTIONS_ENV, RegistryConfig};
pub use error::SessionError;
pub use locale::{LocaleTable, Localizer, Passthrough};
pub use policy::{AdmissionPolicy, DEFAULT_MAX_CONNECTIONS_PER_ADDRESS};
pub use registry::SessionRegistry;
pub use session::{Identity, IdentitySlot, Session};
