use std::fmt::Write;

use anyhow::Result;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::Database;
use crate::models::Session;

const SCHEME: &str = "sha256";

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

/// Hash a password as `sha256$<salt>$<hex digest of salt || password>`
/// with a fresh random 16-byte salt.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = to_hex(&salt_bytes);
    let hash = digest(&salt, password);
    format!("{SCHEME}${salt}${hash}")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a password against a stored hash. Bare 64-character hex digests
/// (unsalted SHA-256, as written by older releases) are still accepted.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    match parts.as_slice() {
        [SCHEME, salt, hash] => constant_time_eq(digest(salt, password).as_bytes(), hash.as_bytes()),
        [legacy] if legacy.len() == 64 && legacy.chars().all(|c| c.is_ascii_hexdigit()) => {
            let hash = to_hex(&Sha256::digest(password.as_bytes()));
            constant_time_eq(hash.as_bytes(), legacy.to_ascii_lowercase().as_bytes())
        }
        _ => false,
    }
}

/// Look up `username` and check `password`. `None` on unknown user or wrong password.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<Option<Session>> {
    let Some(user) = db.get_user(username)? else {
        debug!(%username, "login for unknown user");
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash) {
        debug!(%username, "login with wrong password");
        return Ok(None);
    }
    Ok(Some(Session {
        username: user.username,
        role: user.role,
    }))
}
