//! HS256 custom tokens and id-token claim decoding

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a custom sign-in token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomClaims {
    /// The user id the token signs in as
    pub uid: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

/// Subset of the claims in an identity provider id token
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

impl IdTokenClaims {
    pub fn principal(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.sub.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,
}

/// Sign a custom token for `uid`, valid for `ttl_secs`
pub fn mint_custom_token(uid: &str, secret: &str, ttl_secs: i64) -> Result<String, TokenError> {
    let now = chrono::Utc::now().timestamp();
    let claims = CustomClaims {
        uid: uid.to_string(),
        exp: now + ttl_secs,
        iat: now,
    };

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Invalid)?;
    let payload = URL_SAFE_NO_PAD.encode(payload);
    let message = format!("{}.{}", header, payload);

    let signature = URL_SAFE_NO_PAD.encode(sign(&message, secret)?);
    Ok(format!("{}.{}", message, signature))
}

/// Verify a custom token's signature and expiry
pub fn verify_custom_token(token: &str, secret: &str) -> Result<CustomClaims, TokenError> {
    let (header_b64, payload_b64, signature_b64) = split(token)?;

    let message = format!("{}.{}", header_b64, payload_b64);
    let provided = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::Invalid)?;

    // Constant-time comparison
    keyed(&message, secret)?
        .verify_slice(&provided)
        .map_err(|_| TokenError::Invalid)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Invalid)?;
    let claims: CustomClaims = serde_json::from_slice(&payload).map_err(|_| TokenError::Invalid)?;

    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// Read id-token claims without checking the signature.
/// Only for tokens just received from the identity provider over TLS.
pub fn decode_claims_unverified(token: &str) -> Result<IdTokenClaims, TokenError> {
    let (_, payload_b64, _) = split(token)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Invalid)?;
    serde_json::from_slice(&payload).map_err(|_| TokenError::Invalid)
}

fn split(token: &str) -> Result<(&str, &str, &str), TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [header, payload, signature] => Ok((*header, *payload, *signature)),
        _ => Err(TokenError::Invalid),
    }
}

fn keyed(message: &str, secret: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::Invalid)?;
    mac.update(message.as_bytes());
    Ok(mac)
}

fn sign(message: &str, secret: &str) -> Result<Vec<u8>, TokenError> {
    Ok(keyed(message, secret)?.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn minted_token_verifies() {
        let token = mint_custom_token("nurse-7", SECRET, 60).unwrap();
        let claims = verify_custom_token(&token, SECRET).unwrap();
        assert_eq!(claims.uid, "nurse-7");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_custom_token("nurse-7", SECRET, 60).unwrap();
        assert_eq!(verify_custom_token(&token, "other"), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_payload_or_signature_is_rejected() {
        let token = mint_custom_token("nurse-7", SECRET, 60).unwrap();
        let (header, _, signature) = split(&token).unwrap();

        let forged = URL_SAFE_NO_PAD.encode(br#"{"uid":"admin","exp":9999999999,"iat":0}"#);
        let swapped = format!("{}.{}.{}", header, forged, signature);
        assert_eq!(verify_custom_token(&swapped, SECRET), Err(TokenError::Invalid));

        let truncated = &token[..token.len() - 2];
        assert_eq!(verify_custom_token(truncated, SECRET), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint_custom_token("nurse-7", SECRET, -10).unwrap();
        assert_eq!(verify_custom_token(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert_eq!(verify_custom_token("abc", SECRET), Err(TokenError::Invalid));
        assert!(decode_claims_unverified("a.b").is_err());
    }

    #[test]
    fn reads_principal_from_id_token() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"user_id":"u-1","sub":"u-1","aud":"demo"}"#);
        let token = format!("e30.{}.sig", payload);
        let claims = decode_claims_unverified(&token).unwrap();
        assert_eq!(claims.principal(), Some("u-1"));
    }
}
