//! Password hashing.
//!
//! Three hashers are available: Argon2id (preferred), PBKDF2-HMAC-SHA256 in
//! the `pbkdf2_sha256$<iterations>$<salt>$<hash>` format, and bcrypt. Hashing
//! and verification run on `tokio::task::spawn_blocking`.
//!
//! [`PasswordHashers`] is the ordered list configured by
//! `settings.auth.password_hashers`: the first entry hashes new passwords, the
//! rest are accepted when verifying and reported by [`PasswordHashers::must_update`]
//! so that stored hashes can be upgraded on the next successful login.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use simple_auth_core::{AuthError, AuthResult};

/// Prefix marking an unusable password.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";

const UNUSABLE_PASSWORD_SUFFIX_BYTES: usize = 20;

/// A password hashing algorithm.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// The algorithm identifier ("argon2", "bcrypt", "`pbkdf2_sha256`").
    fn algorithm(&self) -> &'static str;

    /// Returns `true` if `encoded` was produced by this algorithm.
    fn recognizes(&self, encoded: &str) -> bool;

    /// Hashes `password` into a self-describing encoded string.
    async fn hash(&self, password: &str) -> AuthResult<String>;

    /// Verifies `password` against `encoded`.
    async fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool>;

    /// Returns `true` if `encoded` uses weaker parameters than this hasher.
    fn must_update(&self, encoded: &str) -> bool;
}

fn join_error(e: &tokio::task::JoinError) -> AuthError {
    AuthError::InternalServerError(format!("Task join error: {e}"))
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    fn algorithm(&self) -> &'static str {
        "argon2"
    }

    fn recognizes(&self, encoded: &str) -> bool {
        encoded.starts_with("$argon2")
    }

    async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};
            use argon2::Argon2;

            let salt = SaltString::generate(&mut OsRng);
            let hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| AuthError::InternalServerError(format!("Argon2 hash error: {e}")))?;
            Ok(hash.to_string())
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{PasswordHash, PasswordVerifier};
            use argon2::Argon2;

            let Ok(parsed) = PasswordHash::new(&encoded) else {
                return Ok(false);
            };
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        !encoded.starts_with("$argon2id$")
    }
}

/// bcrypt with a configurable cost.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    pub cost: u32,
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self { cost: 12 }
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    fn algorithm(&self) -> &'static str {
        "bcrypt"
    }

    fn recognizes(&self, encoded: &str) -> bool {
        ["$2a$", "$2b$", "$2y$"].iter().any(|p| encoded.starts_with(p))
    }

    async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(password, cost)
                .map_err(|e| AuthError::InternalServerError(format!("Bcrypt hash error: {e}")))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || Ok(bcrypt::verify(password, &encoded).unwrap_or(false)))
            .await
            .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        encoded
            .get(4..6)
            .and_then(|cost| cost.parse::<u32>().ok())
            .is_some_and(|stored| stored < self.cost)
    }
}

/// PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    pub iterations: u32,
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self {
            iterations: 600_000,
        }
    }
}

impl Pbkdf2Hasher {
    fn encode(password: &str, salt: &str, iterations: u32) -> AuthResult<String> {
        use base64::Engine;

        let mut dk = [0u8; 32];
        pbkdf2_hmac_sha256(password.as_bytes(), salt.as_bytes(), iterations, &mut dk)?;
        let hash = base64::engine::general_purpose::STANDARD.encode(dk);
        Ok(format!("pbkdf2_sha256${iterations}${salt}${hash}"))
    }
}

#[async_trait]
impl PasswordHasher for Pbkdf2Hasher {
    fn algorithm(&self) -> &'static str {
        "pbkdf2_sha256"
    }

    fn recognizes(&self, encoded: &str) -> bool {
        encoded.starts_with("pbkdf2_sha256$")
    }

    async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_string();
        let iterations = self.iterations;
        tokio::task::spawn_blocking(move || {
            let salt = random_string(22);
            Self::encode(&password, &salt, iterations)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            let parts: Vec<&str> = encoded.splitn(4, '$').collect();
            let [algorithm, iterations, salt, _] = parts.as_slice() else {
                return Ok(false);
            };
            if *algorithm != "pbkdf2_sha256" {
                return Ok(false);
            }
            let Ok(iterations) = iterations.parse::<u32>() else {
                return Ok(false);
            };
            let computed = Self::encode(&password, salt, iterations)?;
            Ok(constant_time_eq(computed.as_bytes(), encoded.as_bytes()))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        encoded
            .strip_prefix("pbkdf2_sha256$")
            .and_then(|rest| rest.split('$').next())
            .and_then(|iterations| iterations.parse::<u32>().ok())
            .is_some_and(|stored| stored != self.iterations)
    }
}

/// PBKDF2 (RFC 8018) with HMAC-SHA256 as the PRF.
fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output: &mut [u8],
) -> AuthResult<()> {
    let prf = || {
        Hmac::<Sha256>::new_from_slice(password)
            .map_err(|e| AuthError::InternalServerError(format!("HMAC key error: {e}")))
    };

    for (index, chunk) in output.chunks_mut(32).enumerate() {
        let block = u32::try_from(index + 1)
            .map_err(|_| AuthError::InternalServerError("PBKDF2 output too long".into()))?;
        let mut mac = prf()?;
        mac.update(salt);
        mac.update(&block.to_be_bytes());
        let mut u = mac.finalize().into_bytes();
        let mut result = u.to_vec();

        for _ in 1..iterations {
            let mut mac = prf()?;
            mac.update(&u);
            u = mac.finalize().into_bytes();
            for (r, x) in result.iter_mut().zip(u.iter()) {
                *r ^= x;
            }
        }
        chunk.copy_from_slice(&result[..chunk.len()]);
    }
    Ok(())
}

/// Constant-time byte comparison.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

fn random_string(len: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Returns the hasher registered under `name`.
pub fn hasher_by_name(name: &str) -> AuthResult<Arc<dyn PasswordHasher>> {
    match name {
        "argon2" => Ok(Arc::new(Argon2Hasher)),
        "pbkdf2_sha256" => Ok(Arc::new(Pbkdf2Hasher::default())),
        "bcrypt" => Ok(Arc::new(BcryptHasher::default())),
        other => Err(AuthError::ConfigurationError(format!(
            "Unknown password hasher '{other}'"
        ))),
    }
}

/// The configured hashers, preferred first.
#[derive(Clone)]
pub struct PasswordHashers {
    hashers: Vec<Arc<dyn PasswordHasher>>,
}

impl fmt::Debug for PasswordHashers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hashers.iter().map(|h| h.algorithm()))
            .finish()
    }
}

impl Default for PasswordHashers {
    fn default() -> Self {
        Self {
            hashers: vec![
                Arc::new(Argon2Hasher),
                Arc::new(Pbkdf2Hasher::default()),
                Arc::new(BcryptHasher::default()),
            ],
        }
    }
}

impl PasswordHashers {
    pub fn new(hashers: Vec<Arc<dyn PasswordHasher>>) -> AuthResult<Self> {
        if hashers.is_empty() {
            return Err(AuthError::ConfigurationError(
                "At least one password hasher must be configured".into(),
            ));
        }
        Ok(Self { hashers })
    }

    /// Builds the list from algorithm names, e.g. `settings.auth.password_hashers`.
    pub fn from_names(names: &[String]) -> AuthResult<Self> {
        let hashers = names
            .iter()
            .map(|name| hasher_by_name(name))
            .collect::<AuthResult<Vec<_>>>()?;
        Self::new(hashers)
    }

    pub fn preferred(&self) -> &dyn PasswordHasher {
        self.hashers[0].as_ref()
    }

    pub fn algorithms(&self) -> Vec<&'static str> {
        self.hashers.iter().map(|h| h.algorithm()).collect()
    }

    fn identify(&self, encoded: &str) -> Option<&dyn PasswordHasher> {
        self.hashers
            .iter()
            .find(|h| h.recognizes(encoded))
            .map(AsRef::as_ref)
    }

    /// Hashes `raw` with the preferred hasher; `None` yields an unusable password.
    pub async fn make_password(&self, raw: Option<&str>) -> AuthResult<String> {
        match raw {
            Some(raw) => self.preferred().hash(raw).await,
            None => Ok(make_unusable_password()),
        }
    }

    /// Checks `raw` against `encoded`.
    ///
    /// Unusable passwords and hashes from algorithms that are not configured
    /// never match.
    pub async fn check_password(&self, raw: &str, encoded: &str) -> AuthResult<bool> {
        if !is_password_usable(encoded) {
            return Ok(false);
        }
        let Some(hasher) = self.identify(encoded) else {
            tracing::warn!("password hash uses an unconfigured algorithm");
            return Ok(false);
        };
        hasher.verify(raw, encoded).await
    }

    /// Returns `true` if `encoded` should be re-hashed with the preferred hasher.
    pub fn must_update(&self, encoded: &str) -> bool {
        if !is_password_usable(encoded) {
            return false;
        }
        let preferred = self.preferred();
        match self.identify(encoded) {
            Some(hasher) if hasher.algorithm() == preferred.algorithm() => {
                preferred.must_update(encoded)
            }
            _ => true,
        }
    }
}

/// Hashes `raw` with the default preferred hasher (Argon2id).
pub async fn make_password(raw: &str) -> AuthResult<String> {
    PasswordHashers::default().make_password(Some(raw)).await
}

/// Checks `raw` against `encoded` using the default hashers.
pub async fn check_password(raw: &str, encoded: &str) -> AuthResult<bool> {
    PasswordHashers::default().check_password(raw, encoded).await
}

/// Returns `false` for empty and `!`-prefixed hashes.
pub fn is_password_usable(encoded: &str) -> bool {
    !encoded.is_empty() && !encoded.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

/// A random value that no password hashes to.
pub fn make_unusable_password() -> String {
    format!(
        "{UNUSABLE_PASSWORD_PREFIX}{}",
        random_string(UNUSABLE_PASSWORD_SUFFIX_BYTES * 2)
    )
}
