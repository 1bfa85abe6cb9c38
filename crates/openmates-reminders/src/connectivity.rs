use openmates_protocol::frames::EventFrame;

/// What `ReminderEngine` needs from the SyncBroker to route a fired
/// reminder (step 3): whether the user has a live session, and
/// if so, a way to fan the event out to it. Kept as a trait rather than a
/// direct dependency on the gateway crate, which in turn depends on this
/// one to run the engine.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self, user_id: &str) -> bool;
    fn broadcast(&self, user_id: &str, event: EventFrame);
}
