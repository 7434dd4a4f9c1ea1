//! Authentication: JWT tokens, Argon2 password hashes and request auth

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Request;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Token lifetime: one working day
const TOKEN_TTL_SECS: usize = 8 * 60 * 60;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    /// "admin" or "user"
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

/// Authenticated caller of a NATS request
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthInfo {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Generate a signed HS256 token valid for eight hours
pub fn generate_token(user_id: Uuid, email: &str, role: &str, secret: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a token and return its claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(data.claims)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` for a wrong password, `Err` when the stored hash is unusable
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Extract the caller from the request token. Every subject except
/// `callcenter.ping` and `callcenter.auth.login` goes through here.
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo> {
    let token = request
        .token
        .as_deref()
        .ok_or_else(|| anyhow!("No authentication provided, token is required"))?;

    let claims = validate_token(token, jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|e| anyhow!("Invalid user id in token: {}", e))?;

    Ok(AuthInfo {
        user_id,
        email: claims.email,
        role: claims.role,
    })
}

/// Like [`extract_auth`] but also requires the admin role
pub fn require_admin<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo, AdminCheck> {
    let auth = extract_auth(request, jwt_secret).map_err(AdminCheck::Unauthorized)?;
    if !auth.is_admin() {
        return Err(AdminCheck::Forbidden);
    }
    Ok(auth)
}

/// Why [`require_admin`] refused a request
#[derive(Debug)]
pub enum AdminCheck {
    Unauthorized(anyhow::Error),
    Forbidden,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmptyPayload;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct-password").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("any-password", "not-a-valid-hash").is_err());
    }

    #[test]
    fn test_token_roundtrip_and_expiry_window() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "lead@example.com", ROLE_ADMIN, TEST_SECRET).unwrap();

        let claims = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 8 * 60 * 60);
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let token = generate_token(Uuid::new_v4(), "a@b.com", ROLE_USER, TEST_SECRET).unwrap();
        assert!(validate_token(&token, "another-secret-key-that-is-32-bytes!!").is_err());
        assert!(validate_token("not.a.token", TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_requires_token() {
        let request = Request {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            token: None,
            payload: EmptyPayload::default(),
        };
        assert!(extract_auth(&request, TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_with_valid_token() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "a@b.com", ROLE_USER, TEST_SECRET).unwrap();
        let request = Request::with_token(token, EmptyPayload::default());

        let auth = extract_auth(&request, TEST_SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.email, "a@b.com");
        assert!(!auth.is_admin());
    }

    #[test]
    fn test_require_admin_distinguishes_forbidden_from_unauthorized() {
        let user_token = generate_token(Uuid::new_v4(), "u@b.com", ROLE_USER, TEST_SECRET).unwrap();
        let admin_token = generate_token(Uuid::new_v4(), "a@b.com", ROLE_ADMIN, TEST_SECRET).unwrap();

        let user_request = Request::with_token(user_token, EmptyPayload::default());
        let admin_request = Request::with_token(admin_token, EmptyPayload::default());
        let bad_request = Request::with_token("garbage".to_string(), EmptyPayload::default());

        assert!(matches!(require_admin(&user_request, TEST_SECRET), Err(AdminCheck::Forbidden)));
        assert!(require_admin(&admin_request, TEST_SECRET).unwrap().is_admin());
        assert!(matches!(
            require_admin(&bad_request, TEST_SECRET),
            Err(AdminCheck::Unauthorized(_))
        ));
    }
}
