//! Drains HotCache writes into durable SQLite storage, retrying transient
//! failures with backoff and coalescing draft writes per (user, chat).

pub mod task;
pub mod worker;

pub use task::{NewChat, PersistenceTask};
pub use worker::{channel, hash_user_id, PersistenceHandle, PersistenceWorker};
