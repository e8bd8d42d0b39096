//! Authentication hook for validating player identity.
//!
//! Castle doesn't issue or verify tokens itself. It defines the
//! [`Authenticator`] trait, a single async method from token to
//! [`Identity`], and the connection handler calls it during the hello
//! exchange. Players who send no token at all stay anonymous and can
//! only use the casual queue.

use castle_protocol::UserId;

use crate::SessionError;

/// Who a player is, as far as the server is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub name: String,
}

impl Identity {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }
}

/// Validates a client's auth token and returns its identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use castle_protocol::UserId;
/// use castle_session::{Authenticator, Identity, SessionError};
///
/// /// Accepts tokens of the form "<id>:<name>". Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         let (id, name) = token
///             .split_once(':')
///             .ok_or_else(|| SessionError::AuthFailed("expected id:name".into()))?;
///         let id: i64 = id
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("id must be a number".into()))?;
///         Ok(Identity::new(UserId(id), name))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the player's identity.
    ///
    /// Returns [`SessionError::AuthFailed`] if the token is rejected.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}
