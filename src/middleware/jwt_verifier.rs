//! A `TokenVerifier` backed by `jsonwebtoken`. This stands in for the real identity
//! provider (Firebase) the spec places out of scope (§1): it validates the token's
//! signature and expiry against a shared secret/JWKS-derived key and maps claims
//! onto our `Claims` type. Swappable for a real Firebase-backed verifier without
//! touching any caller.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AppError;
use crate::models::Claims;
use crate::middleware::auth::TokenVerifier;

pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self { decoding_key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[tokio::test]
    async fn rejects_tampered_token() {
        let verifier = JwtTokenVerifier::new("secret");
        let other = JwtTokenVerifier::new("wrong-secret");
        let claims = Claims { sub: "u1".to_string(), email: None, exp: 9_999_999_999, iat: 0 };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();

        assert!(verifier.verify(&token).await.is_ok());
        assert!(other.verify(&token).await.is_err());
    }
}
