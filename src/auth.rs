use crate::config::AuthConfig;
use async_trait::async_trait;

/// Credential checks performed on behalf of the daemon
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether a bearer token grants access to restricted procedures
    fn verify_token(&self, token: &str) -> bool;

    /// Whether `password` is the user's password
    async fn validate_password(&self, password: &str) -> bool;
}

/// [`Authenticator`] with a fixed token and password from configuration.
/// A credential that is not configured never matches.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    token: Option<String>,
    password: Option<String>,
}

impl StaticAuthenticator {
    pub fn new(token: Option<String>, password: Option<String>) -> Self {
        Self { token, password }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.token.clone(), config.password.clone())
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn verify_token(&self, token: &str) -> bool {
        matches!(&self.token, Some(expected) if constant_time_eq(expected.as_bytes(), token.as_bytes()))
    }

    async fn validate_password(&self, password: &str) -> bool {
        matches!(&self.password, Some(expected) if constant_time_eq(expected.as_bytes(), password.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
