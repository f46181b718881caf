//! `sqlsentry chat` — Interactive or single-message chat mode.

use sqlsentry_agent::TurnRunner;
use sqlsentry_config::Settings;
use sqlsentry_core::message::{Conversation, ConversationId, Message};
use sqlsentry_core::provider::Provider;
use sqlsentry_guard::{SqlGuard, SqlLimits};
use sqlsentry_memory::TranscriptStore;
use sqlsentry_providers::OllamaProvider;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    message: Option<String>,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = Arc::new(OllamaProvider::new(
        &settings.model.base_url,
        settings.model.request_timeout_secs,
    ));

    // Fail early with a clear message when the backend is down — every turn
    // needs it.
    if !provider.health_check().await.unwrap_or(false) {
        eprintln!();
        eprintln!("  ERROR: Cannot reach Ollama at {}", settings.model.base_url);
        eprintln!();
        eprintln!("  Start it with:    ollama serve");
        eprintln!("  Pull the model:   ollama pull {}", settings.model.model);
        eprintln!();
        return Err("Ollama backend unreachable. See above for setup instructions.".into());
    }

    let limits = SqlLimits {
        max_joins: settings.sql.max_joins,
        max_subqueries: settings.sql.max_subqueries,
    };
    let tools = Arc::new(sqlsentry_tools::default_registry(limits));
    let runner = TurnRunner::new(provider, tools, SqlGuard::new(limits), &settings.model.model)
        .with_temperature(settings.model.temperature)
        .with_max_iterations(settings.agent.max_iterations)
        .with_max_history(settings.agent.max_history_messages);

    let store = TranscriptStore::new(&settings.data_dir)?;
    let (session_id, mut conversation) = match session {
        Some(id) => {
            let messages = store.load(&id)?;
            tracing::info!(session_id = %id, messages = messages.len(), "Resuming session");
            let conv = Conversation::resume(ConversationId::from(&id), messages);
            (id, conv)
        }
        None => (store.create_session()?, Conversation::new()),
    };

    if let Some(msg) = message {
        // Single message mode
        store.append(&session_id, &Message::user(&msg))?;

        eprint!("  Thinking...");
        let response = runner.run_turn(&mut conversation, &msg).await?;
        eprint!("\r              \r");

        store.append(&session_id, &Message::assistant(&response))?;
        println!("{response}");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        sqlsentry — SQL-guarded chat          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:      {} @ {}", settings.model.model, settings.model.base_url);
    println!("  Session:    {session_id}");
    println!(
        "  SQL policy: SELECT only, max {} joins, max {} subqueries",
        limits.max_joins, limits.max_subqueries
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim().to_string();
        if input.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if matches!(input.as_str(), "exit" | "quit" | "q" | "/exit" | "/quit") {
            break;
        }

        store.append(&session_id, &Message::user(&input))?;

        eprint!("  ...");
        match runner.run_turn(&mut conversation, &input).await {
            Ok(response) => {
                eprint!("\r     \r");
                store.append(&session_id, &Message::assistant(&response))?;
                println!();
                for line in response.lines() {
                    println!("  Agent > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Session saved: {session_id}");
    println!("  Goodbye!");
    println!();

    Ok(())
}
