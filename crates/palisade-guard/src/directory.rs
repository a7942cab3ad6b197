//! The directory service collaborator.
//!
//! The directory registers platforms and publishes the signing keys used to
//! mint platform bearer tokens. Only the two lookups the vault consumes are
//! modeled here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GuardError;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single JSON Web Key as served by the directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Public key material, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
}

/// A JSON Web Key Set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Lookups against the platform directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// The signing keys bearer tokens are verified against.
    async fn signing_keys(&self) -> Result<Jwks, GuardError>;

    /// Base URLs of the currently active peer platforms.
    async fn active_platforms(&self) -> Result<Vec<String>, GuardError>;
}

/// HTTP directory client. Fetches `/.well-known/jwks.json` and `/platforms`
/// relative to the directory base URL, with a bounded timeout.
pub struct HttpDirectory {
    base: Url,
    client: reqwest::Client,
}

impl HttpDirectory {
    pub fn new(base: Url) -> Self {
        Self { base, client: reqwest::Client::new() }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GuardError> {
        self.base
            .join(path)
            .map_err(|e| GuardError::Directory(format!("invalid directory url: {e}")))
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn signing_keys(&self) -> Result<Jwks, GuardError> {
        let url = self.endpoint("/.well-known/jwks.json")?;
        let response = self
            .client
            .get(url)
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardError::Directory(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| GuardError::Directory(e.to_string()))
    }

    async fn active_platforms(&self) -> Result<Vec<String>, GuardError> {
        let url = self.endpoint("/platforms")?;
        let response = self
            .client
            .get(url)
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardError::Directory(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| GuardError::Directory(e.to_string()))
    }
}

/// Fixed directory contents for tests and standalone use.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    pub keys: Jwks,
    pub platforms: Vec<String>,
}

impl StaticDirectory {
    pub fn with_platforms(platforms: Vec<String>) -> Self {
        Self { keys: Jwks::default(), platforms }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn signing_keys(&self) -> Result<Jwks, GuardError> {
        Ok(self.keys.clone())
    }

    async fn active_platforms(&self) -> Result<Vec<String>, GuardError> {
        Ok(self.platforms.clone())
    }
}
