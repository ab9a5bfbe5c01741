//! The dialog session: owns memory, the active flow and the transcript,
//! and runs one turn at a time.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::SchoolBackend;
use crate::dispatch::{Dispatcher, FlowCommand, Outcome, confirmation_answer};
use crate::error::{AssistantError, BackendError};
use crate::flow::{FlowKind, FlowState, FlowTurn};
use crate::intent::{Intent, classify_normalized};
use crate::memory::{ConversationMemory, MemoryPatch};
use crate::message::{Message, Reply};
use crate::normalize::normalize;
use crate::phrases::{FixedPhrases, PhrasePicker};
use crate::policy::Identity;

pub struct DialogSession {
    backend: Arc<dyn SchoolBackend>,
    identity: Identity,
    phrases: Box<dyn PhrasePicker>,
    memory: ConversationMemory,
    flow: Option<FlowState>,
    transcript: Vec<Message>,
}

impl DialogSession {
    pub fn new(backend: Arc<dyn SchoolBackend>, identity: Identity) -> Self {
        Self {
            backend,
            identity,
            phrases: Box::new(FixedPhrases),
            memory: ConversationMemory::default(),
            flow: None,
            transcript: Vec::new(),
        }
    }

    /// Start a session for whoever the backend is signed in as.
    pub async fn connect(backend: Arc<dyn SchoolBackend>) -> Result<Self, BackendError> {
        let identity = backend.current_identity().await?;
        tracing::info!(user_id = identity.id, role = %identity.role, "dialog session started");
        Ok(Self::new(backend, identity))
    }

    pub fn with_phrases(mut self, phrases: impl PhrasePicker + 'static) -> Self {
        self.phrases = Box::new(phrases);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn active_flow(&self) -> Option<&FlowState> {
        self.flow.as_ref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Run one classify-and-dispatch cycle for a line of user text.
    pub async fn submit_turn(&mut self, text: &str) -> Reply {
        self.transcript.push(Message::user(text));
        let input = normalize(text);
        let dispatcher = Dispatcher::new(self.backend.as_ref(), &self.identity, self.phrases.as_ref());

        if let Some(pending) = self.memory.pending_confirm().cloned() {
            match confirmation_answer(&input.text) {
                Some(true) => {
                    let outcome = dispatcher.confirm(pending, &self.memory).await;
                    return self.apply(outcome);
                }
                Some(false) => {
                    let outcome = dispatcher.decline();
                    return self.apply(outcome);
                }
                None => {
                    tracing::debug!(pending = %pending.describe(), "pending confirmation dropped");
                    self.memory = std::mem::take(&mut self.memory).merge(MemoryPatch::clear_pending());
                }
            }
        }

        let intent = classify_normalized(text, &input);

        if let Some(mut state) = self.flow.take() {
            let restart = match &intent {
                Intent::CreateExam { .. } => state.kind != FlowKind::CreateExam,
                Intent::AddStudent => state.kind != FlowKind::AddStudent,
                _ => false,
            };
            if restart {
                tracing::debug!(discarded = state.kind.as_str(), "flow replaced by a new one");
            } else {
                let outcome = match state.absorb(text, &input.text) {
                    FlowTurn::Cancel => dispatcher.cancel_flow(),
                    FlowTurn::Absorbed(filled) => dispatcher.continue_flow(&state, &filled),
                    FlowTurn::Submit(_) => dispatcher.submit_flow(&state).await,
                };
                self.flow = Some(state);
                return self.apply(outcome);
            }
        }

        let outcome = dispatcher.dispatch(intent, text, &self.memory).await;
        self.apply(outcome)
    }

    /// Direct edit of a flow field (last write wins).
    pub fn submit_flow_field(&mut self, key: &str, value: &str) -> Result<(), AssistantError> {
        let state = self.flow.as_mut().ok_or(AssistantError::NoActiveFlow)?;
        state.set_field(key, value)
    }

    /// Submit the active flow now, whatever the last turn said.
    pub async fn submit_flow_now(&mut self) -> Result<Reply, AssistantError> {
        let state = self.flow.clone().ok_or(AssistantError::NoActiveFlow)?;
        let dispatcher = Dispatcher::new(self.backend.as_ref(), &self.identity, self.phrases.as_ref());
        let outcome = dispatcher.submit_flow(&state).await;
        Ok(self.apply(outcome))
    }

    pub fn cancel_flow(&mut self) -> Result<Reply, AssistantError> {
        if self.flow.is_none() {
            return Err(AssistantError::NoActiveFlow);
        }
        let dispatcher = Dispatcher::new(self.backend.as_ref(), &self.identity, self.phrases.as_ref());
        let outcome = dispatcher.cancel_flow();
        Ok(self.apply(outcome))
    }

    /// Apply an outcome in one step: memory, flow, transcript.
    fn apply(&mut self, outcome: Outcome) -> Reply {
        if let Some(update) = outcome.memory {
            self.memory = std::mem::take(&mut self.memory).merge(update);
        }
        match outcome.flow {
            FlowCommand::Keep => {}
            FlowCommand::Start(state) => self.flow = Some(state),
            FlowCommand::Clear => self.flow = None,
        }
        let message = Message::assistant(outcome.text, outcome.chips);
        self.transcript.push(message.clone());
        Reply {
            status: outcome.status,
            message,
            navigation: outcome.navigation,
            flow: self.flow.clone(),
        }
    }
}

/// Shared, turn-at-a-time access to a session. A call made while another is
/// still running fails with [`AssistantError::Busy`] instead of queueing.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<DialogSession>>,
}

impl SessionHandle {
    pub fn new(session: DialogSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub async fn try_submit_turn(&self, text: &str) -> Result<Reply, AssistantError> {
        let mut session = self.inner.try_lock().map_err(|_| AssistantError::Busy)?;
        Ok(session.submit_turn(text).await)
    }

    pub fn try_submit_flow_field(&self, key: &str, value: &str) -> Result<(), AssistantError> {
        let mut session = self.inner.try_lock().map_err(|_| AssistantError::Busy)?;
        session.submit_flow_field(key, value)
    }

    pub async fn try_submit_flow_now(&self) -> Result<Reply, AssistantError> {
        let mut session = self.inner.try_lock().map_err(|_| AssistantError::Busy)?;
        session.submit_flow_now().await
    }

    pub fn try_cancel_flow(&self) -> Result<Reply, AssistantError> {
        let mut session = self.inner.try_lock().map_err(|_| AssistantError::Busy)?;
        session.cancel_flow()
    }

    /// Read session state, waiting for any running turn to finish.
    pub async fn read<R>(&self, f: impl FnOnce(&DialogSession) -> R) -> R {
        let session = self.inner.lock().await;
        f(&session)
    }
}
