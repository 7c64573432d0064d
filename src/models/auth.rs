//! Minimal claims shape for the externally-verified bearer token (§1, §6).
//!
//! Token verification itself is an external collaborator (the identity
//! provider) — these types only describe what a verified token hands back.

use serde::{Deserialize, Serialize};

/// Claims carried by a verified identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated principal attached to request extensions once a bearer
/// token has been verified (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self { id: claims.sub, email: claims.email }
    }
}
