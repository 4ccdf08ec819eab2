use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use openssl::rsa::Rsa;
use serde::{Deserialize, Serialize};

use super::ServiceError;

/// Signs and verifies detached JWS signatures over bootstrap token payloads
/// with RS256. When no private key is configured the server runs in
/// insecure/dev mode (§4.6, §9): bootstrap accepts any non-empty bearer
/// without verification.
pub enum SigningKey {
    Rsa {
        encoding: EncodingKey,
        decoding: DecodingKey,
    },
    Insecure,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPayload {
    pub id: String,
    pub secret: String,
}

impl SigningKey {
    pub fn from_pem(private_key_pem: &[u8]) -> Result<Self, ServiceError> {
        let rsa = Rsa::private_key_from_pem(private_key_pem)
            .map_err(|e| ServiceError::Internal(format!("invalid RSA signing key: {e}")))?;
        let public_pem = rsa
            .public_key_to_pem()
            .map_err(|e| ServiceError::Internal(format!("failed to derive public key: {e}")))?;
        let encoding = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ServiceError::Internal(format!("invalid RSA signing key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(&public_pem)
            .map_err(|e| ServiceError::Internal(format!("invalid RSA signing key: {e}")))?;
        Ok(SigningKey::Rsa { encoding, decoding })
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, SigningKey::Rsa { .. })
    }

    /// Produces a detached JWS signature over `json(id, secret)`. Returns
    /// `None` in insecure mode (nothing to sign with).
    pub fn sign(&self, payload: &TokenPayload) -> Result<Option<String>, ServiceError> {
        let SigningKey::Rsa { encoding, .. } = self else {
            return Ok(None);
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), payload, encoding)
            .map_err(|e| ServiceError::Internal(format!("jws signing failed: {e}")))?;
        Ok(Some(token))
    }

    /// Verifies a JWS bearer against the server's public key and returns
    /// the embedded token payload. Only meaningful in secure mode; callers
    /// must check `is_secure()` first.
    pub fn verify(&self, bearer: &str) -> Result<TokenPayload, ServiceError> {
        let SigningKey::Rsa { decoding, .. } = self else {
            return Err(ServiceError::InvalidArgument("server is not in secure mode".into()));
        };
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<TokenPayload>(bearer, decoding, &validation)
            .map_err(|_| ServiceError::InvalidArgument("invalid bearer token".into()))?;
        Ok(data.claims)
    }
}
