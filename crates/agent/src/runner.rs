//! The guarded turn loop implementation.

use sqlsentry_core::error::Error;
use sqlsentry_core::message::{Conversation, Message, MessageToolCall, Role};
use sqlsentry_core::provider::{Provider, ProviderRequest};
use sqlsentry_core::tool::{ToolCall, ToolRegistry};
use sqlsentry_guard::SqlGuard;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Emitted instead of the candidate response when the guard still rejects it
/// at the iteration ceiling. Unvalidated SQL is never emitted just because
/// retries ran out.
pub const SAFETY_FALLBACK: &str = "I can't provide that response because it contained SQL that \
     failed safety validation. Please rephrase your request, or ask me to validate a specific \
     SELECT query.";

/// Injected as the leading system message on a conversation's first turn.
/// Instruction-following is layer one; the guard behind it is the
/// enforcement layer.
const SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant with access to a SQL validation tool.

Security rules for SQL queries:
1. ALWAYS use the 'sql_validator' tool to validate ANY SQL query.
2. NEVER write raw SQL directly in your response without validating it first.
3. If a user provides SQL, validate it with the tool before discussing it.
4. If you need to suggest SQL, run it through the tool first, then present the validated result.

Every response is independently checked for unvalidated SQL; responses that fail the check are discarded and regenerated.";

/// The phases of one turn. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Think,
    Act,
    Observe,
    Respond,
    Guard,
    Done,
}

/// Working memory for one turn. Discarded when the turn completes.
#[derive(Debug, Default)]
pub struct TurnState {
    /// Think-act-observe cycles so far, incremented on every THINK entry
    pub iteration: u32,

    /// Whether OBSERVE requested another reasoning cycle
    pub should_continue: bool,

    /// Tool call requested by the model, pending execution
    pub pending_call: Option<MessageToolCall>,

    /// Output of the most recent tool execution
    pub last_observation: Option<String>,

    /// The terminal response, set only once the guard has passed it (or the
    /// safety fallback at the ceiling)
    pub response: Option<String>,
}

/// Drives the turn state machine over a conversation.
///
/// Single-threaded and cooperative: one turn runs to `Done` before the next
/// begins, and the only suspension points are the backend call in THINK and
/// the tool call in ACT.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    guard: SqlGuard,
    model: String,
    temperature: f32,
    max_iterations: u32,
    max_history_messages: usize,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        guard: SqlGuard,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            guard,
            model: model.into(),
            temperature: 0.7,
            max_iterations: 3,
            max_history_messages: 50,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the hard ceiling on reasoning cycles per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the maximum history messages sent to the backend.
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history_messages = max;
        self
    }

    /// Run one full turn: from the user's message to a guard-approved
    /// response (or the safety fallback).
    ///
    /// A backend failure is fatal for the turn and surfaces here; a tool
    /// failure is captured as an observation and never aborts the turn.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_message: impl Into<String>,
    ) -> Result<String, Error> {
        if conversation.messages.first().map(|m| m.role) != Some(Role::System) {
            conversation.messages.insert(0, Message::system(SYSTEM_PROMPT));
        }
        conversation.push(Message::user(user_message));

        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Starting turn"
        );

        let mut state = TurnState::default();
        let mut phase = Phase::Think;

        while phase != Phase::Done {
            phase = match phase {
                Phase::Think => self.think(conversation, &mut state).await?,
                Phase::Act => self.act(conversation, &mut state).await,
                Phase::Observe => self.observe(&mut state),
                Phase::Respond => self.respond(conversation, &mut state),
                Phase::Guard => self.guard_response(conversation, &mut state),
                Phase::Done => Phase::Done,
            };
        }

        Ok(state.response.unwrap_or_else(|| SAFETY_FALLBACK.to_string()))
    }

    /// THINK: the model reads the conversation and either requests a tool
    /// call or produces a candidate response.
    async fn think(
        &self,
        conversation: &mut Conversation,
        state: &mut TurnState,
    ) -> Result<Phase, Error> {
        state.iteration += 1;
        debug!(iteration = state.iteration, "THINK");

        conversation.trim_to_recent(self.max_history_messages);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: None,
            tools: self.tools.definitions(),
        };

        let response = self.provider.complete(request).await?;
        let tool_call = response.message.tool_calls.first().cloned();
        conversation.push(response.message);

        match tool_call {
            Some(call) => {
                state.pending_call = Some(call);
                Ok(Phase::Act)
            }
            None => Ok(Phase::Respond),
        }
    }

    /// ACT: execute the requested tool. Failures become observations, not
    /// faults.
    async fn act(&self, conversation: &mut Conversation, state: &mut TurnState) -> Phase {
        let Some(call) = state.pending_call.take() else {
            state.last_observation = None;
            return Phase::Observe;
        };

        debug!(tool = %call.name, "ACT");

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        };

        let observation = match self.tools.execute(&tool_call).await {
            Ok(result) => result.output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };

        conversation.push(Message::tool_result(&call.id, &observation));
        state.last_observation = Some(observation);
        Phase::Observe
    }

    /// OBSERVE: decide whether another reasoning cycle is needed. A failed
    /// tool execution requests one; the ceiling can veto it (a forced exit,
    /// not a failure).
    fn observe(&self, state: &mut TurnState) -> Phase {
        state.should_continue = state
            .last_observation
            .as_deref()
            .is_some_and(|obs| obs.starts_with("Error:"));

        if state.should_continue && state.iteration < self.max_iterations {
            debug!(iteration = state.iteration, "OBSERVE requests another cycle");
            Phase::Think
        } else {
            Phase::Respond
        }
    }

    /// RESPOND: the most recent message is the candidate response.
    fn respond(&self, conversation: &Conversation, state: &mut TurnState) -> Phase {
        state.response = conversation.last().map(|m| m.content.clone());
        debug!("RESPOND");
        Phase::Guard
    }

    /// GUARD: evaluate the exact text about to be emitted. Unsafe text is
    /// discarded — regenerated while the ceiling allows, replaced by the
    /// fixed fallback otherwise.
    fn guard_response(&self, conversation: &mut Conversation, state: &mut TurnState) -> Phase {
        let candidate = state.response.clone().unwrap_or_default();
        let verdict = self.guard.check(&candidate);

        if verdict.safe {
            debug!(iteration = state.iteration, "GUARD accepted response");
            return Phase::Done;
        }

        warn!(summary = %verdict.summary, "GUARD rejected response");

        if state.iteration < self.max_iterations {
            // The rejected text stays in history so regeneration is informed;
            // it is never emitted.
            state.response = None;
            conversation.push(Message::system(format!(
                "Your previous response was rejected by the SQL safety check ({}). \
                 Respond again without raw SQL; route queries through the sql_validator tool.",
                verdict.summary
            )));
            Phase::Think
        } else {
            state.response = Some(SAFETY_FALLBACK.to_string());
            conversation.push(Message::assistant(SAFETY_FALLBACK));
            Phase::Done
        }
    }
}
