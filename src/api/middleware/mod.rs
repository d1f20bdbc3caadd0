//! API middleware

mod cors;
mod jwt;

pub use cors::cors_layer;
pub use jwt::{
    bearer_token, require_auth, AuthError, IssuedToken, Operator, OperatorClaims, OperatorTokens,
    TOKEN_ISSUER,
};
