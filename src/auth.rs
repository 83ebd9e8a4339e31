use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::models::Author;

/// Bearer credential for mutating calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub token: String,
    pub user: Option<Author>,
    /// Expiry as unix seconds, when the issuer provided one
    pub expires_at: Option<u64>,
}

impl Credential {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            user: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        expires_at < now
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Source of the viewer's credential. Absence gates mutations; it is not an error.
pub trait CredentialProvider: Send + Sync {
    fn current_credential(&self) -> Option<Credential>;
}

/// In-memory credential holder for the running session.
#[derive(Default)]
pub struct SessionCredentials {
    current: RwLock<Option<Credential>>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
        }
    }

    pub fn login(&self, credential: Credential) {
        info!(
            user = credential.user.as_ref().map(|u| u.username.as_str()).unwrap_or("<unknown>"),
            "Signed in"
        );
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credential);
    }

    pub fn logout(&self) {
        debug!("Signed out");
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn current_credential(&self) -> Option<Credential> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().filter(|c| !c.is_expired()).cloned()
    }
}
