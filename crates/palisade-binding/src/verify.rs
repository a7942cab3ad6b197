//! Detached signature verification against a signer's published keys.
//!
//! A provisioner signer identifies itself as a JWKS URL with the key id in
//! the fragment: `https://host/.well-known/jwks.json#<kid>`. The referenced
//! key must be an Ed25519 OKP key; the signature is a detached ed25519
//! signature over the canonical document bytes, base64url-encoded.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use url::Url;

use palisade_guard::Jwks;

use crate::error::BindingError;

const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches a signer's published key set.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_jwks(&self, url: &str) -> Result<Jwks, BindingError>;
}

/// HTTP key fetcher with a bounded timeout.
#[derive(Default)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_jwks(&self, url: &str) -> Result<Jwks, BindingError> {
        let response = self
            .client
            .get(url)
            .timeout(KEY_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| BindingError::KeyFetch(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| BindingError::KeyFetch(e.to_string()))
    }
}

/// Fixed key sets for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticKeyFetcher {
    pub jwks: Jwks,
}

#[async_trait]
impl KeyFetcher for StaticKeyFetcher {
    async fn fetch_jwks(&self, _url: &str) -> Result<Jwks, BindingError> {
        Ok(self.jwks.clone())
    }
}

/// A parsed provisioner signer reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerRef {
    pub jwks_url: String,
    pub kid: String,
}

/// Parse a signer string of the form `<origin>/.well-known/jwks.json#<kid>`.
/// Anything else is not a provisioner signer.
pub fn parse_signer(signer: &str) -> Option<SignerRef> {
    let url = Url::parse(signer).ok()?;
    if !url.path().ends_with("/.well-known/jwks.json") {
        return None;
    }
    let kid = url.fragment()?.to_string();
    if kid.is_empty() {
        return None;
    }
    Some(SignerRef {
        jwks_url: format!("{}{}", url.origin().ascii_serialization(), url.path()),
        kid,
    })
}

fn decode_base64url(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()
}

/// Verify a detached ed25519 signature over `message` against the signer's
/// published key. Any failure — unparseable signer, unreachable key set,
/// wrong key type, bad signature — verifies as `false`.
pub async fn verify_detached_signature(
    fetcher: &dyn KeyFetcher,
    signer: &str,
    signature: &str,
    message: &[u8],
) -> bool {
    let Some(signer_ref) = parse_signer(signer) else {
        return false;
    };
    let jwks = match fetcher.fetch_jwks(&signer_ref.jwks_url).await {
        Ok(jwks) => jwks,
        Err(e) => {
            tracing::debug!(error = %e, "signer key fetch failed");
            return false;
        }
    };
    let Some(jwk) = jwks.keys.iter().find(|k| k.kid.as_deref() == Some(signer_ref.kid.as_str()))
    else {
        return false;
    };
    if jwk.kty != "OKP" || jwk.crv.as_deref() != Some("Ed25519") {
        return false;
    }
    let Some(key_bytes) = jwk.x.as_deref().and_then(decode_base64url) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Some(signature_bytes) = decode_base64url(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
