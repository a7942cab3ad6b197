//! Bearer-token verification against the directory's signing keys.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value as Json;

use crate::directory::Directory;
use crate::error::GuardError;

/// Claims of a verified platform bearer token.
#[derive(Clone, Debug)]
pub struct PlatformClaims {
    /// The platform URL carried in the token, if any. Used to exclude the
    /// originator from webhook fan-out.
    pub platform: Option<String>,
    pub claims: Json,
}

/// Verifies EdDSA bearer tokens against the directory's JWKS.
pub struct TokenVerifier {
    directory: Arc<dyn Directory>,
}

impl TokenVerifier {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Verify an `Authorization` header value. Returns `None` for absent,
    /// malformed, or unverifiable tokens — callers fall back to ACL
    /// evaluation in that case.
    pub async fn verify_bearer(&self, auth_header: Option<&str>) -> Option<PlatformClaims> {
        let token = auth_header?.strip_prefix("Bearer ")?;
        match self.verify(token).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }

    async fn verify(&self, token: &str) -> Result<PlatformClaims, GuardError> {
        let jwks = self.directory.signing_keys().await?;
        let header =
            decode_header(token).map_err(|e| GuardError::TokenRejected(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_required_spec_claims::<&str>(&[]);

        let candidates = jwks.keys.iter().filter(|k| {
            k.kty == "OKP"
                && k.crv.as_deref() == Some("Ed25519")
                && (header.kid.is_none() || k.kid == header.kid)
        });

        let mut last_error = GuardError::TokenRejected("no matching signing key".into());
        for jwk in candidates {
            let Some(x) = &jwk.x else { continue };
            let key = match DecodingKey::from_ed_components(x) {
                Ok(key) => key,
                Err(e) => {
                    last_error = GuardError::TokenRejected(e.to_string());
                    continue;
                }
            };
            match decode::<Json>(token, &key, &validation) {
                Ok(data) => {
                    let platform = data
                        .claims
                        .get("platform")
                        .and_then(Json::as_str)
                        .map(str::to_string);
                    return Ok(PlatformClaims { platform, claims: data.claims });
                }
                Err(e) => last_error = GuardError::TokenRejected(e.to_string()),
            }
        }
        Err(last_error)
    }
}

/// Derive the caller identity from a bearer token's key id: the part of
/// `kid` before the `#` fragment. End-user tokens are signed with the
/// user's own key, so the kid prefix names the user; the ACL check decides
/// whether that identity may touch the record.
pub fn identity_from_bearer(token: &str) -> Option<String> {
    let header = decode_header(token).ok()?;
    let kid = header.kid?;
    let identity = kid.split('#').next()?;
    if identity.is_empty() {
        return None;
    }
    Some(identity.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    fn unsigned_token(header: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode("{}"),
            URL_SAFE_NO_PAD.encode("sig")
        )
    }

    #[test]
    fn test_identity_from_bearer_strips_key_fragment() {
        let token = unsigned_token(r#"{"alg":"EdDSA","kid":"@alice#key-0"}"#);
        assert_eq!(identity_from_bearer(&token).as_deref(), Some("@alice"));
    }

    #[test]
    fn test_identity_from_bearer_without_kid() {
        let token = unsigned_token(r#"{"alg":"EdDSA"}"#);
        assert_eq!(identity_from_bearer(&token), None);
    }

    #[test]
    fn test_identity_from_bearer_rejects_garbage() {
        assert_eq!(identity_from_bearer("not-a-jwt"), None);
    }

    #[tokio::test]
    async fn test_verify_bearer_rejects_malformed_tokens() {
        let verifier =
            TokenVerifier::new(std::sync::Arc::new(crate::directory::StaticDirectory::default()));
        assert!(verifier.verify_bearer(None).await.is_none());
        assert!(verifier.verify_bearer(Some("Basic abc")).await.is_none());
        assert!(verifier.verify_bearer(Some("Bearer not-a-jwt")).await.is_none());
    }
}
