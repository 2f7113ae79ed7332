//! HS256 identity tokens and session cookies.
//!
//! ID tokens are short-lived and sent as `Authorization: Bearer` (or
//! `X-Firebase-Token`). `POST /api/auth/session` trades one for a longer-lived
//! `__session` cookie. Both are JWTs signed with the same secret and told apart
//! by the `kind` claim.

use chrono::{DateTime, Duration, Utc};
use eventhaiti_web::{Identity, IdentityError, IdentityVerifier, SESSION_COOKIE};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which credential a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer token
    Id,
    /// Cookie minted by the session endpoint
    Session,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Admin claim
    #[serde(default)]
    pub admin: bool,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issue time (unix seconds)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Unique token id
    pub jti: String,
    /// Credential kind
    pub kind: TokenKind,
}

/// A minted session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    /// Signed JWT
    pub value: String,
    /// Lifetime
    pub max_age: Duration,
}

impl SessionCookie {
    /// `Set-Cookie` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!(
            "{SESSION_COOKIE}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax; Secure",
            self.value,
            self.max_age.num_seconds()
        )
    }
}

/// Creates and verifies tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    id_token_ttl: Duration,
    session_ttl: Duration,
}

impl JwtService {
    /// Service signing with `secret`. ID tokens live one hour.
    #[must_use]
    pub fn new(secret: &str, issuer: impl Into<String>, session_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            id_token_ttl: Duration::hours(1),
            session_ttl,
        }
    }

    fn sign(&self, identity: &Identity, kind: TokenKind, now: DateTime<Utc>, ttl: Duration) -> Result<String, IdentityError> {
        let claims = Claims {
            sub: identity.uid.clone(),
            admin: identity.is_admin,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| IdentityError::Invalid(e.to_string()))
    }

    /// Sign an ID token for `identity`.
    ///
    /// # Errors
    ///
    /// Signing failures.
    pub fn issue_id_token(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, IdentityError> {
        self.sign(identity, TokenKind::Id, now, self.id_token_ttl)
    }

    /// Exchange a valid ID token for a session cookie.
    ///
    /// # Errors
    ///
    /// The ID token's verification failure.
    pub fn create_session_cookie(&self, id_token: &str, now: DateTime<Utc>) -> Result<SessionCookie, IdentityError> {
        let identity = self.verify(id_token, TokenKind::Id)?;
        let value = self.sign(&identity, TokenKind::Session, now, self.session_ttl)?;
        tracing::info!(uid = %identity.uid, "Session cookie minted");
        Ok(SessionCookie {
            value,
            max_age: self.session_ttl,
        })
    }

    /// Decode and check a token of the expected kind.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Expired`] past `exp`, [`IdentityError::Invalid`] otherwise.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Identity, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdentityError::Expired,
                _ => IdentityError::Invalid(e.to_string()),
            })?;
        if claims.kind != kind {
            return Err(IdentityError::Invalid(format!("expected a {kind:?} token")));
        }
        Ok(Identity {
            uid: claims.sub,
            is_admin: claims.admin,
        })
    }
}

impl IdentityVerifier for JwtService {
    fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError> {
        self.verify(token, TokenKind::Id)
    }

    fn verify_session_cookie(&self, cookie: &str) -> Result<Identity, IdentityError> {
        self.verify(cookie, TokenKind::Session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test_secret_key", "eventhaiti-test", Duration::days(5))
    }

    fn alice() -> Identity {
        Identity {
            uid: "alice".to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn id_tokens_round_trip_with_admin_claim() {
        let admin = Identity {
            uid: "root".to_string(),
            is_admin: true,
        };
        let token = service().issue_id_token(&admin, Utc::now()).unwrap();
        assert_eq!(service().verify_id_token(&token).unwrap(), admin);
    }

    #[test]
    fn session_cookies_are_not_id_tokens() {
        let id_token = service().issue_id_token(&alice(), Utc::now()).unwrap();
        let cookie = service().create_session_cookie(&id_token, Utc::now()).unwrap();

        assert_eq!(service().verify_session_cookie(&cookie.value).unwrap(), alice());
        assert!(matches!(service().verify_id_token(&cookie.value), Err(IdentityError::Invalid(_))));
        assert!(matches!(service().verify_session_cookie(&id_token), Err(IdentityError::Invalid(_))));

        let header = cookie.header_value();
        assert!(header.starts_with("__session="));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Max-Age=432000"));
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let token = service()
            .issue_id_token(&alice(), Utc::now() - Duration::hours(3))
            .unwrap();
        assert_eq!(service().verify_id_token(&token), Err(IdentityError::Expired));
        assert_eq!(
            service().create_session_cookie(&token, Utc::now()).unwrap_err(),
            IdentityError::Expired
        );
    }

    #[test]
    fn other_secrets_and_issuers_are_rejected() {
        let token = service().issue_id_token(&alice(), Utc::now()).unwrap();
        let other_secret = JwtService::new("another", "eventhaiti-test", Duration::days(5));
        let other_issuer = JwtService::new("test_secret_key", "someone-else", Duration::days(5));

        assert!(matches!(other_secret.verify_id_token(&token), Err(IdentityError::Invalid(_))));
        assert!(matches!(other_issuer.verify_id_token(&token), Err(IdentityError::Invalid(_))));
        assert!(matches!(service().verify_id_token("garbage"), Err(IdentityError::Invalid(_))));
    }
}
