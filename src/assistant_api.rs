//! Seam between the chat session and the hosted Assistants API.
//!
//! The session logic only sees the three traits below. [`OpenAiBackend`]
//! implements all of them on top of `async-openai`; tests swap in mocks.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AssistantToolFileSearchResources, AssistantToolResources, AssistantTools,
        AssistantToolsFileSearch, CreateAssistantRequestArgs, CreateFileRequestArgs,
        CreateMessageRequestArgs, CreateMessageRequestContent, CreateRunRequestArgs,
        CreateThreadRequestArgs, CreateVectorStoreFileBatchRequestArgs,
        CreateVectorStoreRequestArgs, FilePurpose, MessageContent, MessageRole,
        ModifyAssistantRequestArgs, RunObject, RunStatus as OpenAiRunStatus,
        VectorStoreFileBatchObject, VectorStoreFileBatchStatus,
    },
};
use async_trait::async_trait;
use std::path::Path;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::models::{Speaker, Turn};

/// What the remote assistant is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantHandle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorStoreHandle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBatch {
    pub id: String,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
}

/// Parameters of one generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub assistant_id: String,
    pub instructions: String,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
}

/// A message produced by a run, reduced to its first content part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMessage {
    pub text: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle>;
    async fn update_instructions(&self, assistant_id: &str, instructions: &str) -> Result<()>;
    async fn attach_vector_store(&self, assistant_id: &str, vector_store_id: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorStoreApi: Send + Sync {
    async fn retrieve_vector_store(&self, id: &str) -> Result<VectorStoreHandle>;
    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreHandle>;
    async fn upload_file(&self, path: &Path) -> Result<UploadedFile>;
    async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch>;
    async fn retrieve_file_batch(&self, vector_store_id: &str, batch_id: &str)
    -> Result<FileBatch>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn create_thread(&self, turns: &[Turn]) -> Result<String>;
    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunState>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunState>;
    /// Messages created by `run_id`, newest first
    async fn list_run_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunMessage>>;
}

/// Everything a chat session needs from the hosted service
pub trait AssistantBackend: AssistantApi + VectorStoreApi + ThreadApi {
    fn assistants(&self) -> &dyn AssistantApi;
    fn vector_stores(&self) -> &dyn VectorStoreApi;
    fn threads(&self) -> &dyn ThreadApi;
}

impl<T: AssistantApi + VectorStoreApi + ThreadApi> AssistantBackend for T {
    fn assistants(&self) -> &dyn AssistantApi {
        self
    }

    fn vector_stores(&self) -> &dyn VectorStoreApi {
        self
    }

    fn threads(&self) -> &dyn ThreadApi {
        self
    }
}

/// `async-openai` implementation of the backend traits
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            tracing::info!(base_url = %url, "Using custom OpenAI base URL");
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
        }
    }
}

fn run_state(run: RunObject) -> RunState {
    let status = match run.status {
        OpenAiRunStatus::Queued => RunStatus::Queued,
        OpenAiRunStatus::InProgress => RunStatus::InProgress,
        OpenAiRunStatus::RequiresAction => RunStatus::RequiresAction,
        OpenAiRunStatus::Cancelling => RunStatus::Cancelling,
        OpenAiRunStatus::Cancelled => RunStatus::Cancelled,
        OpenAiRunStatus::Failed => RunStatus::Failed,
        OpenAiRunStatus::Completed => RunStatus::Completed,
        OpenAiRunStatus::Incomplete => RunStatus::Incomplete,
        OpenAiRunStatus::Expired => RunStatus::Expired,
    };
    RunState {
        id: run.id,
        status,
        last_error: run.last_error.map(|e| e.message),
    }
}

fn file_batch(batch: VectorStoreFileBatchObject) -> FileBatch {
    let status = match batch.status {
        VectorStoreFileBatchStatus::InProgress => BatchStatus::InProgress,
        VectorStoreFileBatchStatus::Completed => BatchStatus::Completed,
        VectorStoreFileBatchStatus::Cancelled => BatchStatus::Cancelled,
        VectorStoreFileBatchStatus::Failed => BatchStatus::Failed,
    };
    FileBatch {
        id: batch.id,
        status,
    }
}

#[async_trait]
impl AssistantApi for OpenAiBackend {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle> {
        let request = CreateAssistantRequestArgs::default()
            .name(spec.name.as_str())
            .instructions(spec.instructions.as_str())
            .model(spec.model.as_str())
            .tools(vec![AssistantTools::FileSearch(
                AssistantToolsFileSearch::default(),
            )])
            .build()?;

        let assistant = self.client.assistants().create(request).await?;
        tracing::info!(assistant_id = %assistant.id, model = %spec.model, "Created assistant");
        Ok(AssistantHandle { id: assistant.id })
    }

    async fn update_instructions(&self, assistant_id: &str, instructions: &str) -> Result<()> {
        let request = ModifyAssistantRequestArgs::default()
            .instructions(instructions)
            .build()?;
        self.client.assistants().update(assistant_id, request).await?;
        Ok(())
    }

    async fn attach_vector_store(&self, assistant_id: &str, vector_store_id: &str) -> Result<()> {
        let request = ModifyAssistantRequestArgs::default()
            .tool_resources(AssistantToolResources {
                code_interpreter: None,
                file_search: Some(AssistantToolFileSearchResources {
                    vector_store_ids: vec![vector_store_id.to_string()],
                }),
            })
            .build()?;
        self.client.assistants().update(assistant_id, request).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStoreApi for OpenAiBackend {
    async fn retrieve_vector_store(&self, id: &str) -> Result<VectorStoreHandle> {
        let store = self.client.vector_stores().retrieve(id).await?;
        Ok(VectorStoreHandle { id: store.id })
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreHandle> {
        let request = CreateVectorStoreRequestArgs::default().name(name).build()?;
        let store = self.client.vector_stores().create(request).await?;
        Ok(VectorStoreHandle { id: store.id })
    }

    async fn upload_file(&self, path: &Path) -> Result<UploadedFile> {
        let request = CreateFileRequestArgs::default()
            .file(path.to_path_buf())
            .purpose(FilePurpose::Assistants)
            .build()?;
        let file = self.client.files().create(request).await?;
        Ok(UploadedFile {
            id: file.id,
            filename: file.filename,
        })
    }

    async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> Result<FileBatch> {
        let request = CreateVectorStoreFileBatchRequestArgs::default()
            .file_ids(file_ids.to_vec())
            .build()?;
        let batch = self
            .client
            .vector_stores()
            .file_batches(vector_store_id)
            .create(request)
            .await?;
        Ok(file_batch(batch))
    }

    async fn retrieve_file_batch(
        &self,
        vector_store_id: &str,
        batch_id: &str,
    ) -> Result<FileBatch> {
        let batch = self
            .client
            .vector_stores()
            .file_batches(vector_store_id)
            .retrieve(batch_id)
            .await?;
        Ok(file_batch(batch))
    }
}

#[async_trait]
impl ThreadApi for OpenAiBackend {
    async fn create_thread(&self, turns: &[Turn]) -> Result<String> {
        let mut messages = Vec::with_capacity(turns.len());
        for turn in turns {
            let role = match turn.speaker {
                Speaker::User => MessageRole::User,
                Speaker::Assistant => MessageRole::Assistant,
            };
            messages.push(
                CreateMessageRequestArgs::default()
                    .role(role)
                    .content(CreateMessageRequestContent::Content(turn.content.clone()))
                    .build()?,
            );
        }

        let request = CreateThreadRequestArgs::default().messages(messages).build()?;
        let thread = self.client.threads().create(request).await?;
        Ok(thread.id)
    }

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunState> {
        let body = CreateRunRequestArgs::default()
            .assistant_id(request.assistant_id.as_str())
            .instructions(request.instructions.as_str())
            .max_prompt_tokens(request.max_prompt_tokens)
            .max_completion_tokens(request.max_completion_tokens)
            .build()?;
        let run = self.client.threads().runs(thread_id).create(body).await?;
        Ok(run_state(run))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunState> {
        let run = self.client.threads().runs(thread_id).retrieve(run_id).await?;
        Ok(run_state(run))
    }

    async fn list_run_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunMessage>> {
        let response = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("run_id", run_id)])
            .await?;

        Ok(response
            .data
            .into_iter()
            .map(|message| RunMessage {
                text: message.content.into_iter().next().and_then(|part| match part {
                    MessageContent::Text(text) => Some(text.text.value),
                    _ => None,
                }),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_run_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        for status in [
            RunStatus::RequiresAction,
            RunStatus::Cancelled,
            RunStatus::Failed,
            RunStatus::Completed,
            RunStatus::Incomplete,
            RunStatus::Expired,
        ] {
            assert!(status.is_terminal(), "{} should be terminal", status.as_str());
        }
    }

    #[test]
    fn test_backend_builds_without_network() {
        let _backend = OpenAiBackend::new("sk-test", Some("http://localhost:9/v1"));
    }
}
