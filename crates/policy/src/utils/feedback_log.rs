//! Append-only feedback log.
//!
//! Each record is one JSON object on its own line. Appends are serialized
//! behind an async mutex whose guard lives inside the blocking write, so
//! concurrent or cancelled submissions never interleave inside a line.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fs::{create_dir_all, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::FeedbackError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub request_id: String,
    pub feedback: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub node_id: String,
}

impl FeedbackRecord {
    pub fn now(request_id: impl Into<String>, feedback: impl Into<String>) -> Self {
        let node_id = hostname::get()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            request_id: request_id.into(),
            feedback: feedback.into(),
            timestamp: Utc::now().timestamp_millis(),
            node_id,
        }
    }
}

#[derive(Debug)]
pub struct FeedbackSink {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FeedbackSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamps and appends one record. Errors are returned, never swallowed.
    pub async fn append(
        &self,
        request_id: &str,
        feedback: &str,
    ) -> Result<FeedbackRecord, FeedbackError> {
        let record = FeedbackRecord::now(request_id, feedback);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let path = self.path.clone();
        // Released by the write itself, even if this future is dropped.
        let guard = self.lock.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            append_line(&path, &line)
        })
        .await
        .map_err(|err| FeedbackError::Join(err.to_string()))??;

        info!(
            request_id = %record.request_id,
            feedback = %record.feedback,
            path = %self.path.display(),
            "feedback recorded"
        );
        Ok(record)
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()
}
