use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use openmates_core::error::{OpenMatesError, Result};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::dek_cache::DekCache;
use crate::types::Envelope;

type HmacSha256 = Hmac<Sha256>;

/// Issues KEKs, encrypts/decrypts with context binding, and computes
/// deterministic HMAC digests.
#[async_trait]
pub trait KeyVault: Send + Sync {
    async fn create_user_key(&self) -> Result<String>;
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: Option<&str>,
    ) -> Result<(Envelope, u32)>;
    async fn decrypt(&self, envelope: &Envelope, key_id: &str, context: Option<&str>)
        -> Result<Vec<u8>>;
    async fn hmac(&self, plaintext: &[u8], hmac_key_id: &str) -> Result<String>;
    async fn verify(&self, plaintext: &[u8], stored_digest: &str, hmac_key_id: &str)
        -> Result<bool>;
}

/// Single-process KeyVault backed by an in-memory KEK store. KEK material
/// never leaves this struct's boundary — `encrypt`/`decrypt` are the only
/// way in or out.
pub struct InProcessKeyVault {
    keks: RwLock<HashMap<String, [u8; 32]>>,
    hmac_keys: RwLock<HashMap<String, [u8; 32]>>,
    dek_cache: Arc<DekCache>,
}

impl InProcessKeyVault {
    pub fn new(dek_cache_ttl: Duration) -> Self {
        Self {
            keks: RwLock::new(HashMap::new()),
            hmac_keys: RwLock::new(HashMap::new()),
            dek_cache: Arc::new(DekCache::new(dek_cache_ttl)),
        }
    }

    /// Ensure an HMAC key exists under `hmac_key_id`, creating it if absent.
    /// Mirrors `create_user_key` but for the shared, non-rotating email-hash
    /// key ("one HMAC key ... shared across users at the KV layer").
    pub async fn ensure_hmac_key(&self, hmac_key_id: &str) {
        let mut keys = self.hmac_keys.write().await;
        keys.entry(hmac_key_id.to_string())
            .or_insert_with(random_key);
    }

    async fn get_kek(&self, key_id: &str) -> Result<[u8; 32]> {
        let keks = self.keks.read().await;
        keks.get(key_id)
            .copied()
            .ok_or_else(|| OpenMatesError::KeyNotFound {
                key_id: key_id.to_string(),
            })
    }

}

#[async_trait]
impl KeyVault for InProcessKeyVault {
    #[instrument(skip(self))]
    async fn create_user_key(&self) -> Result<String> {
        let key_id = Uuid::now_v7().to_string();
        let mut keks = self.keks.write().await;
        keks.insert(key_id.clone(), random_key());
        Ok(key_id)
    }

    #[instrument(skip(self, plaintext))]
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: Option<&str>,
    ) -> Result<(Envelope, u32)> {
        let kek = self.get_kek(key_id).await?;

        // Random DEK per call; wrapped under the KEK, never persisted unwrapped.
        let dek_bytes = random_key();
        let wrap_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek));
        let wrap_nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let wrapped_dek = wrap_cipher
            .encrypt(&wrap_nonce, dek_bytes.as_slice())
            .map_err(|_| OpenMatesError::Internal("DEK wrap failed".into()))?;

        let content_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek_bytes));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = context.unwrap_or("").as_bytes();
        let ciphertext = content_cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| OpenMatesError::Internal("encryption failed".into()))?;

        let wrapped_dek_b64 = base64_encode(&wrapped_dek);
        self.dek_cache
            .put(key_id, Some(&wrapped_dek_b64), dek_bytes)
            .await;

        Ok((
            Envelope {
                nonce: base64_encode(&nonce),
                ciphertext: base64_encode(&ciphertext),
                wrapped_dek: wrapped_dek_b64,
                wrap_nonce: base64_encode(&wrap_nonce),
                key_version: 1,
            },
            1,
        ))
    }

    #[instrument(skip(self, envelope))]
    async fn decrypt(
        &self,
        envelope: &Envelope,
        key_id: &str,
        context: Option<&str>,
    ) -> Result<Vec<u8>> {
        // Cache is keyed by the wrapped DEK itself, which is unique per
        // envelope, so a hot decrypt loop over the same ciphertext skips the
        // unwrap step entirely once warm ("cache token validity
        // for ≤30s to reduce round-trips").
        let dek = if let Some(dek) = self.dek_cache.get(key_id, Some(&envelope.wrapped_dek)).await
        {
            dek
        } else {
            let kek = self.get_kek(key_id).await?;
            let wrapped_dek = base64_decode(&envelope.wrapped_dek)?;
            let wrap_nonce = base64_decode(&envelope.wrap_nonce)?;
            let wrap_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek));
            let dek_bytes = wrap_cipher
                .decrypt(Nonce::from_slice(&wrap_nonce), wrapped_dek.as_slice())
                .map_err(|_| OpenMatesError::InvalidCiphertext)?;
            let dek: [u8; 32] = dek_bytes
                .try_into()
                .map_err(|_| OpenMatesError::InvalidCiphertext)?;
            self.dek_cache
                .put(key_id, Some(&envelope.wrapped_dek), dek)
                .await;
            dek
        };

        let nonce = base64_decode(&envelope.nonce)?;
        let ciphertext = base64_decode(&envelope.ciphertext)?;
        let content_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let aad = context.unwrap_or("").as_bytes();
        let plaintext = content_cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad,
                },
            )
            // A context mismatch changes the AAD, which GCM authenticates —
            // so this also enforces the context-binding rule.
            .map_err(|_| OpenMatesError::InvalidCiphertext)?;

        Ok(plaintext)
    }

    #[instrument(skip(self, plaintext))]
    async fn hmac(&self, plaintext: &[u8], hmac_key_id: &str) -> Result<String> {
        let keys = self.hmac_keys.read().await;
        let key = keys
            .get(hmac_key_id)
            .ok_or_else(|| OpenMatesError::KeyNotFound {
                key_id: hmac_key_id.to_string(),
            })?;
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(plaintext);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    #[instrument(skip(self, plaintext, stored_digest))]
    async fn verify(&self, plaintext: &[u8], stored_digest: &str, hmac_key_id: &str) -> Result<bool> {
        let digest = self.hmac(plaintext, hmac_key_id).await?;
        // Constant-time compare over the decoded bytes so digest length or
        // encoding quirks can't leak timing information either.
        let (Ok(a), Ok(b)) = (hex::decode(&digest), hex::decode(stored_digest)) else {
            return Ok(false);
        };
        if a.len() != b.len() {
            return Ok(false);
        }
        Ok(bool::from(a.ct_eq(&b)))
    }
}

fn random_key() -> [u8; 32] {
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| OpenMatesError::InvalidCiphertext)
}
