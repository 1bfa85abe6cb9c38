//! Applies a reconnecting device's queued offline edits under the same
//! conflict rule live writes use.

pub mod replayer;
pub mod sink;

pub use replayer::OfflineReplayer;
pub use sink::{Broadcaster, PersistenceQueue};
