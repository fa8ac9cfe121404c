//! Claims carried by the backend-issued session credential.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading a persisted session credential.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The credential is not a well-formed JWT.
    #[error("malformed session credential: {0}")]
    Malformed(String),
}

/// Claims of the session cookie the backend sets on login.
///
/// The client never holds the signing secret, so these are read without
/// signature verification and only used to skip checks for credentials that
/// have already expired. The backend stays the authority on validity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Backend account id.
    pub id: String,

    /// Role at the time the credential was issued.
    pub role: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(rename = "userName", default)]
    pub user_name: Option<String>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,
}

impl SessionClaims {
    /// Decode the claims without checking the signature.
    pub fn decode_unverified(token: &str) -> Result<Self, ClaimsError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| ClaimsError::Malformed(e.to_string()))
    }

    /// Check whether the credential expires within `leeway_secs` from now.
    pub fn is_expired(&self, leeway_secs: i64) -> bool {
        self.exp <= Utc::now().timestamp() + leeway_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn make_token(role: &str, exp: i64) -> String {
        let claims = SessionClaims {
            id: "64f0c0ffee".to_string(),
            role: role.to_string(),
            email: Some("ann@shop.test".to_string()),
            user_name: Some("ann".to_string()),
            exp,
            iat: Some(Utc::now().timestamp()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"server-side-secret-the-client-never-sees"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_unverified_reads_claims() {
        let token = make_token("admin", Utc::now().timestamp() + 3600);
        let claims = SessionClaims::decode_unverified(&token).unwrap();
        assert_eq!(claims.id, "64f0c0ffee");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.user_name.as_deref(), Some("ann"));
        assert!(!claims.is_expired(30));
    }

    #[test]
    fn test_expired_credential() {
        let token = make_token("user", Utc::now().timestamp() - 10);
        let claims = SessionClaims::decode_unverified(&token).unwrap();
        assert!(claims.is_expired(0));
    }

    #[test]
    fn test_leeway_counts_as_expired() {
        let token = make_token("user", Utc::now().timestamp() + 10);
        let claims = SessionClaims::decode_unverified(&token).unwrap();
        assert!(!claims.is_expired(0));
        assert!(claims.is_expired(60));
    }

    #[test]
    fn test_malformed_credential() {
        let err = SessionClaims::decode_unverified("not-a-jwt").unwrap_err();
        assert!(matches!(err, ClaimsError::Malformed(_)));
    }
}
