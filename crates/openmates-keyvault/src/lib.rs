pub mod dek_cache;
pub mod types;
pub mod vault;

pub use types::Envelope;
pub use vault::{InProcessKeyVault, KeyVault};
