/// Append-only feedback log.
pub mod feedback_log;
