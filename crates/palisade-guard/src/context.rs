//! Per-request caller context.

use crate::error::GuardError;
use crate::token::PlatformClaims;

/// Who is calling, and on behalf of which tenant.
///
/// `platform` is only set when a bearer token verified against the
/// directory's signing keys. `current_user` is the identity derived from
/// the token's key id; it is meaningful for ACL evaluation even when the
/// token did not verify as a platform credential.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    pub e_name: Option<String>,
    pub current_user: Option<String>,
    pub platform: Option<PlatformClaims>,
}

impl CallContext {
    /// A caller acting on a tenant with no credential at all.
    pub fn anonymous(e_name: impl Into<String>) -> Self {
        Self { e_name: Some(e_name.into()), ..Self::default() }
    }

    /// The tenant this call addresses, or [`GuardError::MissingTenant`].
    pub fn tenant(&self) -> Result<&str, GuardError> {
        match self.e_name.as_deref() {
            Some(e_name) if !e_name.trim().is_empty() => Ok(e_name),
            _ => Err(GuardError::MissingTenant),
        }
    }

    /// Whether a verified platform credential authorizes this call.
    pub fn is_platform(&self) -> bool {
        self.platform.is_some()
    }

    /// The originating platform URL from the verified token, if any.
    pub fn platform_id(&self) -> Option<&str> {
        self.platform.as_ref().and_then(|p| p.platform.as_deref())
    }
}
