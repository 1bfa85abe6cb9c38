use crate::types::{Reminder, SpillSnapshot};
use openmates_core::{OpenMatesError, Result};
use std::collections::HashMap;
use std::path::Path;

const REMINDER_TTL_DAYS: i64 = 7;
const PENDING_DELIVERY_TTL_DAYS: i64 = 60;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Serializes the given reminders and pending-delivery lists to `path`
/// ("Spill/restore": "serialized to a shared-volume JSON file
/// with a backup timestamp"). Called once during the shutdown drain.
pub fn save(
    path: &Path,
    reminders: Vec<Reminder>,
    pending_deliveries: HashMap<String, Vec<serde_json::Value>>,
    now_millis: i64,
) -> Result<()> {
    let snapshot = SpillSnapshot {
        spilled_at_millis: now_millis,
        reminders,
        pending_deliveries,
    };
    let json = serde_json::to_vec_pretty(&snapshot).map_err(OpenMatesError::Serialization)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(OpenMatesError::Io)?;
    }
    std::fs::write(path, json).map_err(OpenMatesError::Io)?;
    Ok(())
}

/// Loads and deletes the spill file, discarding entries older than their
/// respective TTL ("files older than the respective TTL are
/// discarded; younger backups are rehydrated and the files deleted").
/// Returns an empty snapshot if no spill file exists — a clean start, not
/// an error.
pub fn load_and_consume(path: &Path, now_millis: i64) -> Result<SpillSnapshot> {
    if !path.exists() {
        return Ok(SpillSnapshot {
            spilled_at_millis: now_millis,
            reminders: Vec::new(),
            pending_deliveries: HashMap::new(),
        });
    }
    let bytes = std::fs::read(path).map_err(OpenMatesError::Io)?;
    let mut snapshot: SpillSnapshot =
        serde_json::from_slice(&bytes).map_err(OpenMatesError::Serialization)?;
    std::fs::remove_file(path).map_err(OpenMatesError::Io)?;

    let age_millis = now_millis.saturating_sub(snapshot.spilled_at_millis);
    if age_millis > REMINDER_TTL_DAYS * MILLIS_PER_DAY {
        snapshot.reminders.clear();
    }
    if age_millis > PENDING_DELIVERY_TTL_DAYS * MILLIS_PER_DAY {
        snapshot.pending_deliveries.clear();
    }
    Ok(snapshot)
}
