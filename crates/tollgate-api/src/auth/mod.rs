//! Authentication and authorization building blocks
//!
//! - JWT issuing and validation for the local identity provider
//! - Argon2id password hashing
//! - Bearer token validation against the configured identity provider
//! - Role and permission resolution

pub mod jwt;
pub mod password;
pub mod permissions;
pub mod validator;

pub use jwt::{generate_access_token, validate_access_token, Claims, JwtConfig, JwtError};
pub use password::{hash_password_with_config, verify_password, PasswordConfig, PasswordError};
pub use permissions::{
    MemoryRoleRepository, PermissionResolver, PgRoleRepository, RepositoryError, RoleRepository,
};
pub use validator::TokenValidator;

use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Random URL-safe token with 256 bits of entropy
pub(crate) fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Six-digit one-time code
pub(crate) fn random_numeric_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

/// SHA-256 hex digest, used wherever a bearer secret is stored or keyed
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_unique() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_numeric_code_shape() {
        for _ in 0..50 {
            let code = random_numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(hash_token("abc").len(), 64);
    }
}
