//! Bearer token validation
//!
//! Access tokens are HMAC-signed JWTs issued by the auth service. The
//! streaming services only *read* them: signature, expiry (when present) and
//! the numeric `user_id` claim. Issuance, refresh and rotation live in the
//! auth service.
//!
//! # Pure Functions
//!
//! No HTTP framework dependencies (axum, etc.) - those are in module-specific code.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// `Authorization` header present but not of the form `Bearer <token>`
    MalformedHeader,

    /// Token signature, algorithm or expiry check failed
    InvalidToken(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MalformedHeader => write!(f, "Bearer token required"),
            ApiAuthError::InvalidToken(reason) => write!(f, "Invalid or expired token: {}", reason),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Claims
// ========================================

/// Claims read from an access token
///
/// Tokens issued by the auth service carry `user_id` as a JSON number. The
/// claim is kept as raw JSON so that a signed token with an unexpected
/// `user_id` shape still validates and is treated as anonymous.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl Claims {
    /// Positive integral user id, if the claim carries one
    ///
    /// Both `7` and `7.0` decode; strings, zero, negatives and fractions do not.
    pub fn user_id(&self) -> Option<u64> {
        let number = match self.user_id.as_ref()? {
            Value::Number(number) => number,
            _ => return None,
        };

        if let Some(id) = number.as_u64() {
            return (id > 0).then_some(id);
        }

        match number.as_f64() {
            Some(id) if id >= 1.0 && id.fract() == 0.0 && id <= u64::MAX as f64 => Some(id as u64),
            _ => None,
        }
    }
}

// ========================================
// Header Parsing and Token Validation
// ========================================

/// Extract the token from an `Authorization` header value
///
/// # Examples
///
/// ```
/// use mstm_common::api::auth::parse_bearer;
///
/// assert_eq!(parse_bearer("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
/// assert!(parse_bearer("Basic dXNlcjpwYXNz").is_err());
/// assert!(parse_bearer("Bearer ").is_err());
/// ```
pub fn parse_bearer(header_value: &str) -> Result<&str, ApiAuthError> {
    match header_value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(ApiAuthError::MalformedHeader),
    }
}

/// Validate an HMAC-signed token against `secret` and return its claims
///
/// HS256, HS384 and HS512 are accepted. `exp` is checked when present but not
/// required.
pub fn validate_token(token: &str, secret: &[u8]) -> Result<Claims, ApiAuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = true;
    validation.leeway = 30;

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiAuthError::InvalidToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"test-secret";

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn sign(claims: serde_json::Value, secret: &[u8]) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_valid_token_yields_user_id() {
        let token = sign(json!({"user_id": 7, "exp": now_secs() + 600}), SECRET);
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id(), Some(7));
    }

    #[test]
    fn test_token_without_exp_is_accepted() {
        let token = sign(json!({"user_id": 12}), SECRET);
        assert_eq!(validate_token(&token, SECRET).unwrap().user_id(), Some(12));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(json!({"user_id": 7}), b"other-secret");
        assert!(matches!(
            validate_token(&token, SECRET),
            Err(ApiAuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign(json!({"user_id": 7, "exp": now_secs() - 3600}), SECRET);
        assert!(validate_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_non_positive_or_fractional_user_id_ignored() {
        for raw in [json!(0), json!(-4), json!(2.5), json!(0.0)] {
            let claims = Claims { user_id: Some(raw.clone()), exp: None };
            assert_eq!(claims.user_id(), None, "user_id {} should be ignored", raw);
        }
        assert_eq!(Claims::default().user_id(), None);

        let float_id = Claims { user_id: Some(json!(7.0)), exp: None };
        assert_eq!(float_id.user_id(), Some(7));
    }

    #[test]
    fn test_non_numeric_user_id_still_validates() {
        for raw in [json!("7"), json!(null), json!({"id": 7}), json!([7])] {
            let token = sign(json!({"user_id": raw}), SECRET);
            let claims = validate_token(&token, SECRET).expect("signed token should validate");
            assert_eq!(claims.user_id(), None, "user_id {} should be ignored", raw);
        }
    }
}
