//! Authentication hook.
//!
//! Gatehouse doesn't authenticate anyone itself. The accept layer hands
//! the client's handshake token to an [`Authenticator`] and, on success,
//! promotes the pending session under the returned [`PlayerId`].

use gatehouse_protocol::PlayerId;

use crate::SessionError;

/// Validates a client's auth token and returns their stable identity.
///
/// # Example
///
/// ```rust
/// use gatehouse_protocol::PlayerId;
/// use gatehouse_session::{Authenticator, SessionError};
///
/// /// Accepts any numeric token as the player id. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
///         let id: u64 = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
///         Ok(PlayerId(id))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token`.
    ///
    /// # Returns
    /// - `Ok(PlayerId)`: the identity to promote the session under
    /// - `Err(SessionError::AuthFailed)`: the connection is refused
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}
