//! One user's conversation with the hosted assistant.
//!
//! A [`ChatSession`] is created when a user first shows up and lives until the
//! session is ended. It owns the transcript, the assistant handle (through the
//! persona manager) and, once set up, the vector store handle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assistant_api::{AssistantBackend, RunRequest, VectorStoreHandle};
use crate::config::Config;
use crate::error::Result;
use crate::index::IndexManager;
use crate::models::{Role, StatusLine, Transcript, Turn};
use crate::persona::PersonaManager;
use crate::polling::PollOptions;
use crate::reply::generate_reply;

pub struct ChatSession {
    id: Uuid,
    backend: Arc<dyn AssistantBackend>,
    config: Arc<Config>,
    persona: PersonaManager,
    index: Option<VectorStoreHandle>,
    index_attached: bool,
    transcript: Transcript,
    status: Vec<StatusLine>,
    cancel: CancellationToken,
}

impl ChatSession {
    /// Provision the remote assistant for `role` and seed the transcript.
    pub async fn start(
        backend: Arc<dyn AssistantBackend>,
        config: Arc<Config>,
        role: Role,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let persona = PersonaManager::provision(backend.assistants(), &config.openai, role).await?;
        let id = Uuid::new_v4();
        tracing::info!(session_id = %id, %role, "Started chat session");

        Ok(Self {
            id,
            backend,
            config,
            persona,
            index: None,
            index_attached: false,
            transcript: Transcript::new(),
            status: Vec::new(),
            cancel,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.persona.current_role()
    }

    pub fn assistant_id(&self) -> &str {
        &self.persona.assistant().id
    }

    pub fn vector_store(&self) -> Option<&VectorStoreHandle> {
        self.index.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> &[StatusLine] {
        &self.status
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some() && self.index_attached
    }

    /// Bring the assistant's instructions in line with `role`.
    pub async fn select_role(&mut self, role: Role) -> Result<bool> {
        self.persona.reconcile(self.backend.assistants(), role).await
    }

    /// Create or reuse the vector store once per session and attach it to the
    /// assistant. Later calls are no-ops.
    pub async fn ensure_index(&mut self) -> Result<()> {
        if self.index.is_none() {
            let poll = PollOptions::new(self.config.poll_interval(), self.config.upload_timeout());
            let manager =
                IndexManager::new(&self.config.documents, &self.config.vector_store, poll);
            let outcome = manager
                .ensure_index(self.backend.vector_stores(), &self.cancel)
                .await?;
            self.status.extend(outcome.status);
            self.index = Some(outcome.store);
        }

        if !self.index_attached {
            if let Some(store) = &self.index {
                self.backend
                    .assistants()
                    .attach_vector_store(&self.persona.assistant().id, &store.id)
                    .await?;
                tracing::info!(
                    session_id = %self.id,
                    vector_store_id = %store.id,
                    "Attached vector store to assistant"
                );
                self.index_attached = true;
            }
        }

        Ok(())
    }

    pub fn append_user_turn(&mut self, text: impl Into<String>) {
        self.transcript.push(Turn::user(text));
    }

    /// Ask the assistant to answer the current transcript. Failures become an
    /// `Error: ...` turn instead of propagating. Only reachable through
    /// [`ChatSession::interact`], which finishes setup first.
    async fn request_reply(&mut self) {
        let run = RunRequest {
            assistant_id: self.persona.assistant().id.clone(),
            instructions: self.config.openai.run_instructions.clone(),
            max_prompt_tokens: self.config.openai.max_prompt_tokens,
            max_completion_tokens: self.config.openai.max_completion_tokens,
        };
        let poll = PollOptions::new(self.config.poll_interval(), self.config.run_timeout());

        let turn = match generate_reply(
            self.backend.threads(),
            &run,
            self.transcript.turns(),
            poll,
            &self.cancel,
        )
        .await
        {
            Ok(text) => Turn::assistant(text),
            Err(e) => {
                tracing::error!(session_id = %self.id, "Reply generation failed: {}", e);
                Turn::assistant(format!("Error: {e}"))
            }
        };

        self.transcript.push(turn);
    }

    /// One interaction cycle: reconcile the role, finish setup if needed, then
    /// handle `message` when present. Setup failures propagate; reply failures
    /// end up in the transcript.
    pub async fn interact(&mut self, role: Role, message: Option<String>) -> Result<()> {
        self.select_role(role).await?;
        self.ensure_index().await?;

        if let Some(text) = message {
            self.append_user_turn(text);
            self.request_reply().await;
        }
        Ok(())
    }

    /// Abort any in-flight polling for this session.
    pub fn end(&self) {
        self.cancel.cancel();
        tracing::info!(session_id = %self.id, turns = self.transcript.len(), "Ended chat session");
    }
}
