use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Authenticated identity supplied by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub email_verified: bool,
}

/// Seam to the external identity provider: maps bearer tokens to
/// identities. Tokens are registered out-of-band (by the provider
/// integration or by tests).
pub struct IdentityProvider {
    tokens: DashMap<String, Identity>,
}

impl IdentityProvider {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn register_token(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Identity, AppError> {
        let header = header
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("authorization header is not a bearer token".to_string())
        })?;

        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::Unauthorized("unknown token".to_string()))
    }

    /// Order placement requires a verified identity whose id matches the
    /// claimed `userId` in the request body.
    pub fn authorize_customer(
        &self,
        header: Option<&str>,
        claimed_user_id: Uuid,
    ) -> Result<Identity, AppError> {
        let identity = self.verify_bearer(header)?;

        if !identity.email_verified {
            return Err(AppError::Unauthorized("email is not verified".to_string()));
        }
        if identity.user_id != claimed_user_id {
            return Err(AppError::Unauthorized(
                "userId does not match the authenticated identity".to_string(),
            ));
        }

        Ok(identity)
    }
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Identity, IdentityProvider};
    use crate::error::AppError;

    fn provider_with(token: &str, verified: bool) -> (IdentityProvider, Uuid) {
        let provider = IdentityProvider::new();
        let user_id = Uuid::new_v4();
        let identity = Identity {
            user_id,
            email_verified: verified,
        };
        provider.register_token(token, identity);
        (provider, user_id)
    }

    #[test]
    fn accepts_matching_verified_identity() {
        let (provider, user_id) = provider_with("tok-1", true);
        let identity = provider
            .authorize_customer(Some("Bearer tok-1"), user_id)
            .unwrap();
        assert_eq!(identity.user_id, user_id);
    }

    #[test]
    fn rejects_missing_header() {
        let (provider, user_id) = provider_with("tok-1", true);
        let err = provider.authorize_customer(None, user_id).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn rejects_unknown_token() {
        let (provider, user_id) = provider_with("tok-1", true);
        let err = provider
            .authorize_customer(Some("Bearer nope"), user_id)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn rejects_unverified_email() {
        let (provider, user_id) = provider_with("tok-1", false);
        let err = provider
            .authorize_customer(Some("Bearer tok-1"), user_id)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn rejects_identity_mismatch() {
        let (provider, _) = provider_with("tok-1", true);
        let err = provider
            .authorize_customer(Some("Bearer tok-1"), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
