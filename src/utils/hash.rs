// src/utils/hash.rs

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use crate::error::AppError;

/// The shared admin password, kept only as an Argon2 hash after startup.
#[derive(Clone)]
pub struct AdminSecret {
    password_hash: String,
}

impl AdminSecret {
    pub fn new(password: &str) -> Result<Self, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .to_string();

        Ok(Self { password_hash })
    }

    /// Checks a login attempt against the stored hash.
    pub fn verify(&self, candidate: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(&self.password_hash)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

impl std::fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_password() {
        let secret = AdminSecret::new("classroom").unwrap();
        assert!(secret.verify("classroom").unwrap());
        assert!(!secret.verify("Classroom").unwrap());
    }
}
