//! Transcript persistence — append-only JSONL chat history.
//!
//! Each session is one file under `<data_dir>/transcripts/`, one JSON-encoded
//! [`Message`] per line. Appends are flushed to disk (fsync) before they
//! return, so a crash mid-turn loses at most the in-flight turn and never
//! corrupts prior history. The store is owned by the turn currently running;
//! there is no concurrent writer.

use chrono::Utc;
use sqlsentry_core::error::MemoryError;
use sqlsentry_core::message::Message;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Session-scoped append-only transcript storage.
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    /// Open (or create) the transcript directory under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let dir = data_dir.into().join("transcripts");
        fs::create_dir_all(&dir).map_err(|e| {
            MemoryError::Storage(format!("Failed to create transcript directory: {e}"))
        })?;
        Ok(Self { dir })
    }

    /// Start a new session and return its id.
    ///
    /// Ids are timestamp-based (`session_YYYYMMDD_HHMMSS`); a numeric suffix
    /// disambiguates two sessions started within the same second.
    pub fn create_session(&self) -> Result<String, MemoryError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut session_id = format!("session_{stamp}");
        let mut n = 1;
        while self.session_path(&session_id).exists() {
            n += 1;
            session_id = format!("session_{stamp}_{n}");
        }

        File::create(self.session_path(&session_id))
            .map_err(|e| MemoryError::Storage(format!("Failed to create session file: {e}")))?;
        debug!(session_id = %session_id, "Started new transcript session");
        Ok(session_id)
    }

    /// Append one message to a session, durably.
    pub fn append(&self, session_id: &str, message: &Message) -> Result<(), MemoryError> {
        let line = serde_json::to_string(message)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize message: {e}")))?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.session_path(session_id))
            .map_err(|e| MemoryError::Storage(format!("Failed to open session file: {e}")))?;

        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write message: {e}")))?;
        file.sync_all()
            .map_err(|e| MemoryError::Storage(format!("Failed to flush session file: {e}")))?;

        Ok(())
    }

    /// Load a session's messages in order.
    ///
    /// Corrupted lines are skipped with a warning rather than failing the
    /// whole load.
    pub fn load(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(MemoryError::SessionNotFound(session_id.to_string()));
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| MemoryError::Storage(format!("Failed to read session file: {e}")))?;

        let messages = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted transcript line");
                    None
                }
            })
            .collect();

        Ok(messages)
    }

    /// List the most recent session ids, newest first.
    pub fn recent_sessions(&self, count: usize) -> Result<Vec<String>, MemoryError> {
        let mut sessions: Vec<(String, std::time::SystemTime)> = Vec::new();

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("Failed to list transcripts: {e}")))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.starts_with("session_")
                || path.extension().and_then(|e| e.to_str()) != Some("jsonl")
            {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            sessions.push((stem.to_string(), modified));
        }

        sessions.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(sessions.into_iter().take(count).map(|(id, _)| id).collect())
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }
}
