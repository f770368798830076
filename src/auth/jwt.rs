//! JWT token generation and validation

use crate::{
    auth::permissions::Permission,
    config::SecurityConfig,
    error::AppError,
    models::{jurisdiction::Jurisdiction, user::{User, UserRole}},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    pub username: String,

    pub role: UserRole,

    /// 生效权限（角色默认 + 额外授予）
    pub permissions: Vec<Permission>,

    pub jurisdiction: Jurisdiction,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

/// JWT service
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_secs: u64,
}

impl JwtService {
    /// Create JWT service from config
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        let secret = config.jwt_secret.expose_secret();

        // HS256 至少 32 字节
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        let expires_in_secs = config.jwt_expires_in_secs()?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in_secs,
        })
    }

    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in_secs
    }

    /// Generate access token
    pub fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(self.expires_in_secs as i64);

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            permissions: user.effective_permissions(),
            jurisdiction: user.jurisdiction.clone(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode access token: {:?}", e);
            AppError::Internal(format!("Failed to encode access token: {}", e))
        })
    }

    /// Validate and decode token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        Ok(decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                AppError::Unauthorized
            })?
            .claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn security(secret: &str) -> SecurityConfig {
        SecurityConfig {
            jwt_secret: Secret::new(secret.to_string()),
            jwt_expires_in: "1h".to_string(),
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_hash_memory_kib: 1024,
            password_hash_iterations: 1,
            trust_proxy: false,
            cors_allowed_origins: None,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "returning.officer".to_string(),
            email: "ro@example.com".to_string(),
            password_hash: String::new(),
            full_name: "Returning Officer".to_string(),
            role: UserRole::RegionalAdmin,
            jurisdiction: Jurisdiction::county("Nakuru"),
            permissions: vec!["audit:read".to_string()],
            is_active: true,
            last_login: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = JwtService::from_config(&security("test_secret_key_32_characters_long!")).unwrap();
        let user = user();

        let token = service.generate_token(&user).unwrap();
        let claims = service.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "returning.officer");
        assert_eq!(claims.role, UserRole::RegionalAdmin);
        assert!(claims.permissions.contains(&Permission::AuditRead));
        assert!(claims.permissions.contains(&Permission::VotersVerify));
        assert_eq!(claims.jurisdiction, Jurisdiction::county("Nakuru"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_signed_with_other_secret_fails() {
        let a = JwtService::from_config(&security("secret-a-secret-a-secret-a-secret-a")).unwrap();
        let b = JwtService::from_config(&security("secret-b-secret-b-secret-b-secret-b")).unwrap();

        let token = a.generate_token(&user()).unwrap();
        assert!(matches!(b.validate_token(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_invalid_token_fails() {
        let service = JwtService::from_config(&security("test_secret_key_32_characters_long!")).unwrap();
        assert!(service.validate_token("invalid_token").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtService::from_config(&security("short")).is_err());
    }
}
