//! Polls `HotCache`'s reminder sorted set and fires due reminders.
//!
//! # Overview
//!
//! Reminders live entirely in `HotCache` (see `openmates-hotcache::reminders`);
//! this crate only drives the tick loop that scans for due entries and routes
//! them, and the recurrence arithmetic that decides when a fired reminder
//! re-arms.
//!
//! # Recurrence variants
//!
//! | Variant    | Behaviour                               |
//! |------------|------------------------------------------|
//! | `Interval` | Repeat every N seconds                    |
//! | `Daily`    | Fire at HH:MM UTC every day                |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday    |
//!
//! A reminder with no recurrence is one-shot: it stays `Fired` after delivery.

pub mod connectivity;
pub mod engine;
pub mod recurrence;

pub use connectivity::Connectivity;
pub use engine::ReminderEngine;
pub use recurrence::Recurrence;
