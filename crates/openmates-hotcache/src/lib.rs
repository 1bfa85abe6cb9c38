pub mod cache;
pub mod chat_index;
pub mod drafts;
pub mod messages;
pub mod pending_delivery;
pub mod reminders;
pub mod spill;
pub mod types;
pub mod versions;

pub use cache::HotCache;
