//! Scoped proxy token issuing and verification (spec §3, §4.7 capability
//! flow). Tokens are signed HS256 JWTs carrying a [`ProxyClaims`] and must
//! never outlive [`MAX_TOKEN_LIFETIME_SECS`].

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{CoreError, CoreResult};
use crate::model::token::MAX_TOKEN_LIFETIME_SECS;
use crate::model::{PodId, ProxyClaims};

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(signing_key: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: String, pod_id: PodId, pod_slug: String, target_port: u16) -> CoreResult<String> {
        let iat = Utc::now().timestamp();
        let claims = ProxyClaims {
            user_id,
            pod_id,
            pod_slug,
            target_port,
            iat,
            exp: iat + MAX_TOKEN_LIFETIME_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| CoreError::Other(e.into()))
    }

    /// Verify signature, expiry, and the spec §3 hard cap on lifetime (a
    /// token whose own `exp`/`iat` gap exceeds 15 minutes is rejected even
    /// if it otherwise verifies — it could only have been forged or
    /// tampered with, since `issue` never produces one).
    pub fn verify(&self, token: &str) -> CoreResult<ProxyClaims> {
        let data = decode::<ProxyClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| CoreError::Unauthorized(format!("invalid proxy token: {e}")))?;
        let claims = data.claims;
        if claims.exp - claims.iat > MAX_TOKEN_LIFETIME_SECS {
            return Err(CoreError::Unauthorized("proxy token lifetime exceeds the maximum allowed".into()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_verifies_a_round_trip_token() {
        let codec = TokenCodec::new("test-signing-key");
        let token = codec.issue("user_1".into(), PodId::new(), "my-app".into(), 3000).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.target_port, 3000);
        assert_eq!(claims.pod_slug, "my-app");
    }

    #[test]
    fn rejects_garbage_tokens() {
        let codec = TokenCodec::new("test-signing-key");
        assert!(codec.verify("not-a-jwt").is_err());
    }

    #[test]
    fn rejects_tokens_signed_with_a_different_key() {
        let issuer = TokenCodec::new("key-a");
        let verifier = TokenCodec::new("key-b");
        let token = issuer.issue("user_1".into(), PodId::new(), "my-app".into(), 3000).unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
