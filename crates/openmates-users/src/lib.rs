pub mod resolver;

pub use resolver::{NewAccountEnvelope, ResolvedUser, UserResolver};
