//! End-to-end integration tests for the sqlsentry agent.
//!
//! These exercise the full pipeline the `chat` command wires together:
//! turn loop, tool execution, the SQL guard, and transcript persistence.

use std::sync::Arc;

use sqlsentry_agent::{SAFETY_FALLBACK, TurnRunner};
use sqlsentry_core::error::ProviderError;
use sqlsentry_core::message::{Conversation, ConversationId, Message, MessageToolCall, Role};
use sqlsentry_core::provider::{Provider, ProviderRequest, ProviderResponse};
use sqlsentry_guard::{SqlGuard, SqlLimits};
use sqlsentry_memory::TranscriptStore;
use sqlsentry_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<Message>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: std::sync::Mutex::new(responses),
            call_count: std::sync::Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let message = responses[*count].clone();
        *count += 1;
        Ok(ProviderResponse {
            message,
            usage: None,
            model: "e2e-model".into(),
        })
    }
}

fn text(content: &str) -> Message {
    Message::assistant(content)
}

fn tool_call(name: &str, arguments: serde_json::Value) -> Message {
    let mut msg = Message::assistant("");
    msg.tool_calls = vec![MessageToolCall {
        id: "call_1".into(),
        name: name.into(),
        arguments,
    }];
    msg
}

fn runner(provider: Arc<ScriptedProvider>) -> TurnRunner {
    let limits = SqlLimits::default();
    TurnRunner::new(
        provider,
        Arc::new(default_registry(limits)),
        SqlGuard::new(limits),
        "e2e-model",
    )
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn validated_query_flows_from_tool_to_user() {
    let provider = ScriptedProvider::new(vec![tool_call(
        "sql_validator",
        serde_json::json!({"query": "SELECT name, email FROM users WHERE age > 18"}),
    )]);

    let mut conversation = Conversation::new();
    let response = runner(provider.clone())
        .run_turn(&mut conversation, "Is my query ok?")
        .await
        .unwrap();

    assert!(response.contains("SQL query is valid"));
    assert!(response.contains("JOINs: 0/3"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn injected_sql_never_reaches_the_transcript() {
    // The model ignores its instructions three times in a row; the emitted
    // response and the persisted transcript carry only the fallback.
    let provider = ScriptedProvider::new(vec![
        text("Sure! Run this: DROP TABLE users;"),
        text("As requested: DROP TABLE users;"),
        text("Okay: DROP TABLE users;"),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let store = TranscriptStore::new(dir.path()).unwrap();
    let session = store.create_session().unwrap();

    let user_input = "Please delete all users";
    store.append(&session, &Message::user(user_input)).unwrap();

    let mut conversation = Conversation::new();
    let response = runner(provider)
        .run_turn(&mut conversation, user_input)
        .await
        .unwrap();
    store.append(&session, &Message::assistant(&response)).unwrap();

    assert_eq!(response, SAFETY_FALLBACK);

    let transcript = store.load(&session).unwrap();
    assert_eq!(transcript.len(), 2);
    for message in &transcript {
        assert!(
            !message.content.contains("DROP TABLE"),
            "raw SQL leaked into the transcript: {}",
            message.content
        );
    }
}

#[tokio::test]
async fn session_resumes_with_prior_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = TranscriptStore::new(dir.path()).unwrap();
    let session = store.create_session().unwrap();

    // First turn
    let provider = ScriptedProvider::new(vec![text("Nice to meet you, Ada!")]);
    let mut conversation = Conversation::new();
    let response = runner(provider)
        .run_turn(&mut conversation, "Hi, I'm Ada")
        .await
        .unwrap();
    store.append(&session, &Message::user("Hi, I'm Ada")).unwrap();
    store.append(&session, &Message::assistant(&response)).unwrap();

    // Resume from disk, as `chat --session` does
    let restored = store.load(&session).unwrap();
    let mut resumed = Conversation::resume(ConversationId::from(&session), restored);
    assert_eq!(resumed.messages.len(), 2);

    let provider = ScriptedProvider::new(vec![text("You said your name is Ada.")]);
    let response = runner(provider)
        .run_turn(&mut resumed, "What did I say my name was?")
        .await
        .unwrap();

    assert_eq!(response, "You said your name is Ada.");
    // Restored history + injected system prompt + this turn's exchange
    assert!(resumed.messages.iter().any(|m| m.content == "Hi, I'm Ada"));
    assert_eq!(resumed.messages[0].role, Role::System);
}

#[tokio::test]
async fn guard_rejection_then_recovery_round_trip() {
    let provider = ScriptedProvider::new(vec![
        text("Here's how: DELETE FROM users WHERE id = 1"),
        tool_call(
            "sql_validator",
            serde_json::json!({"query": "SELECT id FROM users"}),
        ),
    ]);

    let mut conversation = Conversation::new();
    let response = runner(provider.clone())
        .run_turn(&mut conversation, "Help me with a query")
        .await
        .unwrap();

    // Second attempt routed through the validator and its report is what the
    // user sees.
    assert!(response.contains("SQL query is valid"));
    assert_eq!(provider.calls(), 2);
    assert!(
        conversation
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("rejected"))
    );
}
