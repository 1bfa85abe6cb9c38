use serde::{Deserialize, Serialize};

/// Ciphertext at rest: `(nonce, ciphertext_and_tag, wrapped_DEK)`. DEKs are
/// never persisted unwrapped ("Envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64-encoded AES-GCM nonce used for the content ciphertext.
    pub nonce: String,
    /// Base64-encoded AES-GCM ciphertext + tag.
    pub ciphertext: String,
    /// Base64-encoded DEK, itself AES-GCM-wrapped under the KEK.
    pub wrapped_dek: String,
    /// Base64-encoded nonce used to wrap the DEK.
    pub wrap_nonce: String,
    /// KEK version used. Re-keying is not implemented  but every
    /// envelope reserves the field so it can be added without a migration.
    pub key_version: u32,
}
