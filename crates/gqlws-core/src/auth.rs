use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::connection::User;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing auth token")]
    MissingToken,

    #[error("invalid auth token")]
    InvalidToken,

    #[error("{0}")]
    Rejected(String),
}

/// Resolves the `authToken` of a `connection_init` message into a user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<User, AuthError>;
}

/// Accepts exactly one pre-shared token and binds a fixed user to it.
pub struct SharedSecretAuthenticator {
    token: SecretString,
    user: User,
}

impl SharedSecretAuthenticator {
    pub fn new(token: impl Into<String>, user: User) -> Self {
        Self {
            token: SecretString::from(token.into()),
            user,
        }
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if token != self.token.expose_secret() {
            return Err(AuthError::InvalidToken);
        }
        Ok(self.user.clone())
    }
}

impl std::fmt::Debug for SharedSecretAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretAuthenticator")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn accepts_matching_token() {
        let auth = SharedSecretAuthenticator::new("s3cret", json!("ada"));
        assert_eq!(auth.authenticate("s3cret").await.unwrap(), json!("ada"));
    }

    #[tokio::test]
    async fn rejects_wrong_or_missing_token() {
        let auth = SharedSecretAuthenticator::new("s3cret", json!("ada"));
        assert_eq!(auth.authenticate("nope").await, Err(AuthError::InvalidToken));
        assert_eq!(auth.authenticate("").await, Err(AuthError::MissingToken));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let auth = SharedSecretAuthenticator::new("s3cret", json!("ada"));
        assert!(!format!("{auth:?}").contains("s3cret"));
    }
}
