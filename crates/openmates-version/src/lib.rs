pub mod engine;

pub use engine::{VersionEngine, WriteOutcome};
