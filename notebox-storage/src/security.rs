//! Credential hashing
//!
//! PBKDF2-HMAC-SHA256 for every new credential, plus the old additive rolling
//! hash kept only so that credentials written before salts existed still
//! verify. The legacy path is a compatibility seam, not a security feature:
//! nothing in this crate creates a legacy credential.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// PBKDF2 iteration count. Fixed: stored hashes must stay verifiable.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derived hash length in bytes (256 bits)
pub const HASH_LEN: usize = 32;

/// Salt length in bytes before hex encoding
pub const SALT_LEN: usize = 16;

const SECURITY_TARGET: &str = "notebox::security";

/// Derive a verification hash from a password and salt.
///
/// The salt's text bytes are the PBKDF2 salt. Output is lowercase hex.
pub fn derive_hash(password: &str, salt: &str) -> String {
    let mut out = Zeroizing::new([0u8; HASH_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut *out,
    );
    hex::encode(&*out)
}

/// Generate a random hex salt
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    if let Err(e) = OsRng.try_fill_bytes(&mut salt) {
        tracing::warn!(
            target: SECURITY_TARGET,
            "OS random source failed ({}), using thread-local CSPRNG for salt",
            e
        );
        rand::thread_rng().fill_bytes(&mut salt);
    }
    hex::encode(salt)
}

/// Old non-salted rolling hash. Verification only.
///
/// `h = h * 31 + unit` over UTF-16 code units with 32-bit signed wrap-around,
/// rendered in decimal.
pub fn legacy_hash(password: &str) -> String {
    password
        .encode_utf16()
        .fold(0i32, |h, unit| {
            (h << 5).wrapping_sub(h).wrapping_add(i32::from(unit))
        })
        .to_string()
}

/// Weak deterministic stand-in used only when the KDF cannot run
fn degraded_hash(password: &str, salt: &str) -> String {
    format!("degraded:{}", legacy_hash(&format!("{}{}", salt, password)))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check a password against a stored credential.
///
/// A present salt selects the PBKDF2 path; an absent salt means the credential
/// predates salting and is compared against [`legacy_hash`].
pub fn verify(password: &str, stored_hash: &str, stored_salt: Option<&str>) -> bool {
    match stored_salt {
        Some(salt) => constant_time_eq(&derive_hash(password, salt), stored_hash),
        None => {
            tracing::debug!(target: SECURITY_TARGET, "Verifying legacy unsalted credential");
            constant_time_eq(&legacy_hash(password), stored_hash)
        }
    }
}

/// Result of an off-task derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedHash {
    /// Hex hash (or the degraded stand-in)
    pub hash: String,
    /// True when the KDF could not run and the weak fallback was used
    pub degraded: bool,
}

/// Runs the KDF on the blocking pool so the caller's task suspends instead of
/// stalling its executor thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDerivation;

impl KeyDerivation {
    /// Derive a hash for `password` with `salt`
    pub async fn derive(&self, password: &str, salt: &str) -> DerivedHash {
        let (pw, s) = (Zeroizing::new(password.to_string()), salt.to_string());
        match tokio::task::spawn_blocking(move || derive_hash(&pw, &s)).await {
            Ok(hash) => DerivedHash {
                hash,
                degraded: false,
            },
            Err(e) => {
                tracing::error!(
                    target: SECURITY_TARGET,
                    "Key derivation unavailable ({}); DEGRADED to weak fallback hash",
                    e
                );
                DerivedHash {
                    hash: degraded_hash(password, salt),
                    degraded: true,
                }
            }
        }
    }

    /// Async counterpart of [`verify`]
    pub async fn verify(&self, password: &str, stored_hash: &str, stored_salt: Option<&str>) -> bool {
        match stored_salt {
            Some(salt) => {
                let derived = self.derive(password, salt).await;
                if derived.degraded {
                    tracing::warn!(
                        target: SECURITY_TARGET,
                        "Verifying against degraded hash; result is not a PBKDF2 match"
                    );
                }
                constant_time_eq(&derived.hash, stored_hash)
            }
            None => verify(password, stored_hash, None),
        }
    }
}
