//! Content limits enforced pre-accept, shared by SyncBroker and OfflineReplayer
//! so both paths reject oversized edits the same way.

/// Plaintext title length, in chars.
pub const TITLE_MAX_CHARS: usize = 255;

/// Ciphertext is roughly plaintext + nonce + tag + base64 overhead; a bounded
/// surrogate check on the wire avoids decrypting untrusted input just to
/// measure it.
pub const TITLE_MAX_CIPHERTEXT_BYTES: usize = 1024;

/// Draft/message plaintext word limit.
pub const DRAFT_MAX_WORDS: usize = 14_000;

/// Draft/message plaintext char limit.
pub const DRAFT_MAX_CHARS: usize = 100_000;

/// Ciphertext surrogate bound for drafts and messages (chars * ~1.4 for
/// base64 expansion, rounded up generously).
pub const DRAFT_MAX_CIPHERTEXT_BYTES: usize = 150_000;

/// The number of most-recently-edited chats per user kept warm in HotCache.
pub const DEFAULT_TOP_N: usize = 10;
