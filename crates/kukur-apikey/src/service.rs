//! `ApiKeys`: the management surface the application facade and the RPC
//! auth handler talk to. Owns hashing, random token generation, and the
//! constant-time digest comparison; [`crate::repository::ApiKeyRepository`]
//! only ever sees digests and salts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use kukur_core::{KukurError, Result};
use rand::RngCore;
use scrypt::Params;
use subtle::ConstantTimeEq;

use crate::repository::{ApiKeyRecord, ApiKeyRepository};

/// `N = 2^14 = 16384`, matching the spec's memory-hard hashing parameters.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const DIGEST_LEN: usize = 32;
const SALT_LEN: usize = 16;
/// 40 raw bytes, comfortably above the spec's 40-bytes-of-entropy floor
/// once base64-encoded.
const TOKEN_BYTES: usize = 40;

pub struct ApiKeys<'a> {
    repository: &'a ApiKeyRepository,
}

impl<'a> ApiKeys<'a> {
    pub fn new(repository: &'a ApiKeyRepository) -> Self {
        ApiKeys { repository }
    }

    /// Generate a new key for `name` and store only its salted digest.
    /// Returns the plaintext key — the only time it is ever available.
    pub fn create(&self, name: &str) -> Result<String> {
        let token = random_token();
        let salt = random_salt();
        let digest = hash_api_key(token.as_bytes(), &salt)?;
        self.repository.store(name, &digest, &salt, Utc::now())?;
        Ok(token)
    }

    pub fn list(&self) -> Result<Vec<ApiKeyRecord>> {
        self.repository.list()
    }

    pub fn has_api_key(&self, name: &str) -> Result<bool> {
        self.repository.has_api_key(name)
    }

    /// `true` iff `name` exists and `presented_key` hashes (with the
    /// stored salt) to the stored digest. The comparison itself is
    /// constant-time.
    pub fn validate(&self, name: &str, presented_key: &str) -> Result<bool> {
        let Some((digest, salt)) = self.repository.get(name)? else {
            return Ok(false);
        };
        let presented_digest = hash_api_key(presented_key.as_bytes(), &salt)?;
        Ok(bool::from(presented_digest.ct_eq(&digest)))
    }

    pub fn revoke(&self, name: &str) -> Result<()> {
        self.repository.revoke(name)
    }
}

fn random_token() -> String {
    let mut bytes = vec![0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn hash_api_key(key: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, DIGEST_LEN)
        .map_err(|e| KukurError::Transient(anyhow::anyhow!(e)))?;
    let mut digest = vec![0u8; DIGEST_LEN];
    scrypt::scrypt(key, salt, &params, &mut digest)
        .map_err(|e| KukurError::Transient(anyhow::anyhow!(e)))?;
    Ok(digest)
}
