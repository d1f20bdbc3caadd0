//! Operator sessions for the admin API
//!
//! The single configured operator logs in once and receives a signed HS256
//! bearer token. Tokens carry the issuer, so a token minted by another
//! service sharing the secret is still rejected.

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::error::{Result, WatchError};

/// `iss` claim of every operator token
pub const TOKEN_ISSUER: &str = "sitewatch";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OperatorClaims {
    /// Operator login name
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed session
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies operator sessions
#[derive(Clone)]
pub struct OperatorTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl OperatorTokens {
    /// An empty secret is replaced by 32 random bytes from the OS, so
    /// sessions do not survive a restart.
    pub fn new(secret: &str, lifetime: Duration) -> Result<Self> {
        let key = if secret.is_empty() {
            let mut key_bytes = [0u8; 32];
            OsRng.try_fill_bytes(&mut key_bytes).map_err(|e| {
                WatchError::Internal(format!("failed to generate session secret: {}", e))
            })?;

            debug!("Generated random session secret");
            key_bytes.to_vec()
        } else {
            secret.as_bytes().to_vec()
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
            validation,
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a session for `operator`
    pub fn issue(&self, operator: &str) -> std::result::Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = OperatorClaims {
            sub: operator.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| {
                error!("Failed to sign operator token: {}", e);
                AuthError::Signing
            })?;

        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> std::result::Result<OperatorClaims, AuthError> {
        decode::<OperatorClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Operator token rejected: {}", e);
                AuthError::InvalidToken
            })
    }
}

/// Token part of an `Authorization: Bearer <token>` value. The scheme is
/// matched case-insensitively.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Debug)]
pub enum AuthError {
    BadCredentials,
    Signing,
    InvalidToken,
    MissingToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::BadCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AuthError::Signing => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

/// The logged-in operator behind a request.
///
/// Reads the [`OperatorTokens`] the router installs as a request extension.
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub expires_at: i64,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = bearer_token(authorization).ok_or(AuthError::InvalidToken)?;

        let tokens = parts
            .extensions
            .get::<OperatorTokens>()
            .ok_or(AuthError::InvalidToken)?;

        let claims = tokens.verify(token)?;

        Ok(Operator {
            name: claims.sub,
            expires_at: claims.exp,
        })
    }
}

/// Route layer rejecting requests without a valid operator session
pub async fn require_auth(operator: Operator, req: Request<Body>, next: Next) -> Response {
    debug!(operator = %operator.name, path = %req.uri().path(), "Authenticated request");
    next.run(req).await
}
