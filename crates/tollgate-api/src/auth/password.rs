//! Password hashing with Argon2id
//!
//! Hashes are PHC strings, so the salt and parameters travel with the hash and
//! verification needs nothing else.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2 cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
    /// Output length in bytes
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// Cheap parameters for seeded fixtures and tests
    pub fn lightweight() -> Self {
        Self {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a password with the given Argon2id parameters
///
/// # Returns
///
/// * `Ok(String)` - PHC string format hash
/// * `Err(PasswordError)` - If the parameters are invalid or hashing fails
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        config.to_params()?,
    );

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash
///
/// `Ok(false)` means a wrong password; `Err` means the stored hash is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Minimum rules for a new password
///
/// Length bounds match the registration request validation; the password must
/// also mix letters with at least one digit or symbol.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if len > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }
    if !password.chars().any(char::is_alphabetic) {
        return Err("Password must contain at least one letter".to_string());
    }
    if !password.chars().any(|c| !c.is_alphabetic()) {
        return Err("Password must contain at least one digit or symbol".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let config = PasswordConfig::lightweight();
        let hash = hash_password_with_config("correct horse 1", &config).unwrap();

        assert!(verify_password("correct horse 1", &hash).unwrap());
        assert!(!verify_password("correct horse 2", &hash).unwrap());
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let config = PasswordConfig::lightweight();
        let hash1 = hash_password_with_config("SamePassword123!", &config).unwrap();
        let hash2 = hash_password_with_config("SamePassword123!", &config).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("SamePassword123!", &hash1).unwrap());
        assert!(verify_password("SamePassword123!", &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "invalid-hash-format");
        assert!(matches!(result, Err(PasswordError::InvalidHashFormat)));
    }

    #[test]
    fn test_hash_carries_parameters() {
        let config = PasswordConfig {
            memory_cost: 16384,
            time_cost: 2,
            parallelism: 2,
            output_len: Some(32),
        };
        let hash = hash_password_with_config("TestPassword123!", &config).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=16384"));
        assert!(hash.contains("t=2"));
        assert!(hash.contains("p=2"));
    }

    #[test]
    fn test_password_strength_validation() {
        assert!(validate_password_strength("hunter2hunter").is_ok());
        assert!(validate_password_strength("correct horse battery").is_ok());

        assert!(validate_password_strength("abc1").is_err());
        assert!(validate_password_strength("onlyletters").is_err());
        assert!(validate_password_strength("1234567890").is_err());
        assert!(validate_password_strength(&"a1".repeat(65)).is_err());
    }
}
