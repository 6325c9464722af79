use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Garbled or foreign digest formats verify false rather than erroring, so
/// a corrupt row in the users table reads as a failed login, not a 500.
pub fn verify_password(plain: &str, digest: &str) -> bool {
    let parsed = match PasswordHash::new(digest) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

lazy_static! {
    static ref DUMMY_DIGEST: String =
        hash_password("fernplayer.timing.dummy").unwrap_or_default();
}

/// Burn the same hashing work as a real verification. Called on the
/// unknown-username login path so it is indistinguishable from a
/// wrong-password login in its timing profile.
pub fn verify_against_dummy(plain: &str) {
    let _ = verify_password(plain, &DUMMY_DIGEST);
}
