//! `sqlsentry history` — list recent chat sessions.

use sqlsentry_config::Settings;
use sqlsentry_memory::TranscriptStore;

pub fn run(count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = TranscriptStore::new(&settings.data_dir)?;

    let sessions = store.recent_sessions(count)?;
    if sessions.is_empty() {
        println!("No sessions yet. Start one with: sqlsentry chat");
        return Ok(());
    }

    println!("Recent sessions (newest first):");
    for session_id in sessions {
        match store.load(&session_id) {
            Ok(messages) => println!("  {session_id}  ({} messages)", messages.len()),
            Err(_) => println!("  {session_id}  (unreadable)"),
        }
    }
    println!();
    println!("Resume one with: sqlsentry chat --session <id>");

    Ok(())
}
