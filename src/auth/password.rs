//! Password hashing and verification using Argon2id

use crate::{config::SecurityConfig, error::AppError, validation::ValidationReport};
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

/// Password hasher with configurable cost
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// m = `password_hash_memory_kib`, t = `password_hash_iterations`, p = 1
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        let params = Params::new(
            config.password_hash_memory_kib,
            config.password_hash_iterations,
            1,
            None,
        )
        .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a hash; mismatch is `Unauthorized`
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::debug!("Failed to parse password hash: {:?}", e);
            AppError::Internal(format!("Failed to parse password hash: {}", e))
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized)
    }

    /// 密码策略检查，错误挂在 `password` 字段上
    pub fn check_policy(report: &mut ValidationReport, password: &str, policy: &SecurityConfig) {
        if password.chars().count() < policy.password_min_length {
            report.push(
                "password",
                format!("must be at least {} characters", policy.password_min_length),
            );
        }
        if policy.password_require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            report.push("password", "must contain at least one uppercase letter");
        }
        if policy.password_require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            report.push("password", "must contain at least one digit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn policy() -> SecurityConfig {
        SecurityConfig {
            jwt_secret: Secret::new("x".repeat(32)),
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

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::from_config(&policy()).unwrap();
        let password = "TestPassword123!";

        let hash = hasher.hash(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        hasher.verify(password, &hash).unwrap();
    }

    #[test]
    fn test_verify_fails_with_wrong_password() {
        let hasher = PasswordHasher::from_config(&policy()).unwrap();
        let hash = hasher.hash("TestPassword123!").unwrap();

        let result = hasher.verify("WrongPassword123!", &hash);
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = PasswordHasher::from_config(&policy()).unwrap();
        let a = hasher.hash("TestPassword123!").unwrap();
        let b = hasher.hash("TestPassword123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_policy() {
        let mut report = ValidationReport::new();
        PasswordHasher::check_policy(&mut report, "short", &policy());
        assert_eq!(report.errors().len(), 3);

        let mut report = ValidationReport::new();
        PasswordHasher::check_policy(&mut report, "LongEnough1", &policy());
        assert!(report.is_empty());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut config = policy();
        config.password_hash_memory_kib = 1;
        assert!(PasswordHasher::from_config(&config).is_err());
    }
}
