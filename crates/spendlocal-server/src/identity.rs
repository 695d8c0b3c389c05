//! Request identity
//!
//! Buyers present an HS256 bearer token from the identity provider; the
//! handlers only ever see the narrow [`OwnerIdentity`]. Operators present
//! the static admin token.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use spendlocal_core::OwnerIdentity;
use tracing::debug;

use crate::error::{ErrorResponse, api_error};
use crate::state::AppState;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    pub exp: usize,
}

impl Claims {
    fn into_owner(self) -> OwnerIdentity {
        let display_name = self
            .user_metadata
            .full_name
            .filter(|n| !n.trim().is_empty())
            .or(self.email)
            .unwrap_or_else(|| self.sub.clone());
        OwnerIdentity::new(self.sub, display_name)
    }
}

pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Option<OwnerIdentity> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims.into_owner()),
            Err(e) => {
                debug!(error = %e, "Rejected identity token");
                None
            }
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    api_error(StatusCode::UNAUTHORIZED, "Please sign in to continue.", "UNAUTHORIZED")
}

/// Signed-in buyer
pub struct AuthenticatedOwner(pub OwnerIdentity);

impl FromRequestParts<AppState> for AuthenticatedOwner {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(verifier) = state.identity.as_ref() else {
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Sign-in is not configured.",
                "NOT_CONFIGURED",
            ));
        };
        bearer(&parts.headers)
            .and_then(|token| verifier.verify(token))
            .map(Self)
            .ok_or_else(unauthorized)
    }
}

/// Operator holding `ADMIN_TOKEN`
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Admin access is not configured.",
                "NOT_CONFIGURED",
            ));
        };
        match bearer(&parts.headers) {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(Self),
            _ => Err(unauthorized()),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use spendlocal_core::Owner;

    pub(crate) fn token_for(secret: &str, sub: &str, full_name: Option<&str>) -> String {
        let claims = Claims {
            sub: sub.into(),
            email: Some(format!("{sub}@example.com")),
            user_metadata: UserMetadata {
                full_name: full_name.map(Into::into),
            },
            exp: usize::try_from(chrono::Utc::now().timestamp()).unwrap() + 3600,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_uses_full_name() {
        let verifier = IdentityVerifier::new("s3cret");
        let owner = verifier
            .verify(&token_for("s3cret", "user-1", Some("Dana Reyes")))
            .unwrap();
        assert_eq!(owner.owner_id(), "user-1");
        assert_eq!(owner.display_name(), "Dana Reyes");
    }

    #[test]
    fn test_verify_falls_back_to_email() {
        let verifier = IdentityVerifier::new("s3cret");
        let owner = verifier.verify(&token_for("s3cret", "user-2", None)).unwrap();
        assert_eq!(owner.display_name(), "user-2@example.com");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = IdentityVerifier::new("s3cret");
        assert!(verifier.verify(&token_for("other", "user-1", None)).is_none());
        assert!(verifier.verify("not-a-jwt").is_none());
    }

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer(&headers).is_none());
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer(&headers).is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
    }
}
