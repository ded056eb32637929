#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use adu_permit_chat::assistant_api::{
    AssistantApi, AssistantHandle, AssistantSpec, BatchStatus, FileBatch, RunMessage, RunRequest,
    RunState, RunStatus, ThreadApi, UploadedFile, VectorStoreApi, VectorStoreHandle,
};
use adu_permit_chat::config::Config;
use adu_permit_chat::error::{AduChatError, Result};
use adu_permit_chat::models::Turn;
use async_trait::async_trait;

/// What the fake hosted service should do with the next run
pub enum Scripted {
    Messages(Vec<&'static str>),
    RunError(&'static str),
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub assistants_created: Vec<AssistantSpec>,
    pub instruction_updates: Vec<String>,
    pub attachments: Vec<(String, String)>,
    pub store_lookups: Vec<String>,
    pub stores_created: u32,
    pub uploads: Vec<String>,
    pub batches: u32,
    pub threads: Vec<Vec<String>>,
}

/// In-memory stand-in for the hosted Assistants API
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Calls>,
    pub known_store: Option<String>,
    pub script: Mutex<VecDeque<Scripted>>,
    pub upload_failure: Mutex<Option<&'static str>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_known_store(id: &str) -> Arc<Self> {
        Arc::new(Self {
            known_store: Some(id.to_string()),
            ..Self::default()
        })
    }

    pub fn script(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Make every file upload fail with `message` until cleared with `None`
    pub fn fail_uploads(&self, message: Option<&'static str>) {
        *self.upload_failure.lock().unwrap() = message;
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantApi for FakeBackend {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle> {
        let mut calls = self.calls.lock().unwrap();
        calls.assistants_created.push(spec.clone());
        Ok(AssistantHandle {
            id: format!("asst_{}", calls.assistants_created.len()),
        })
    }

    async fn update_instructions(&self, _assistant_id: &str, instructions: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .instruction_updates
            .push(instructions.to_string());
        Ok(())
    }

    async fn attach_vector_store(&self, assistant_id: &str, vector_store_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .attachments
            .push((assistant_id.to_string(), vector_store_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl VectorStoreApi for FakeBackend {
    async fn retrieve_vector_store(&self, id: &str) -> Result<VectorStoreHandle> {
        self.calls.lock().unwrap().store_lookups.push(id.to_string());
        match &self.known_store {
            Some(known) if known == id => Ok(VectorStoreHandle { id: id.to_string() }),
            _ => Err(AduChatError::Internal(format!("No vector store found with id '{id}'"))),
        }
    }

    async fn create_vector_store(&self, _name: &str) -> Result<VectorStoreHandle> {
        let mut calls = self.calls.lock().unwrap();
        calls.stores_created += 1;
        Ok(VectorStoreHandle {
            id: format!("vs_new_{}", calls.stores_created),
        })
    }

    async fn upload_file(&self, path: &Path) -> Result<UploadedFile> {
        if let Some(message) = *self.upload_failure.lock().unwrap() {
            return Err(AduChatError::Internal(message.to_string()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut calls = self.calls.lock().unwrap();
        calls.uploads.push(name.clone());
        Ok(UploadedFile {
            id: format!("file_{}", calls.uploads.len()),
            filename: name,
        })
    }

    async fn create_file_batch(&self, _vector_store_id: &str, _file_ids: &[String]) -> Result<FileBatch> {
        self.calls.lock().unwrap().batches += 1;
        Ok(FileBatch {
            id: "batch_1".to_string(),
            status: BatchStatus::InProgress,
        })
    }

    async fn retrieve_file_batch(&self, _vector_store_id: &str, batch_id: &str) -> Result<FileBatch> {
        Ok(FileBatch {
            id: batch_id.to_string(),
            status: BatchStatus::Completed,
        })
    }
}

#[async_trait]
impl ThreadApi for FakeBackend {
    async fn create_thread(&self, turns: &[Turn]) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls
            .threads
            .push(turns.iter().map(|t| t.content.clone()).collect());
        Ok(format!("thread_{}", calls.threads.len()))
    }

    async fn create_run(&self, _thread_id: &str, _request: &RunRequest) -> Result<RunState> {
        let failing = matches!(
            self.script.lock().unwrap().front(),
            Some(Scripted::RunError(_))
        );
        if failing {
            if let Some(Scripted::RunError(msg)) = self.script.lock().unwrap().pop_front() {
                return Err(AduChatError::Internal(msg.to_string()));
            }
        }
        Ok(RunState {
            id: "run_1".to_string(),
            status: RunStatus::Queued,
            last_error: None,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<RunState> {
        Ok(RunState {
            id: run_id.to_string(),
            status: RunStatus::Completed,
            last_error: None,
        })
    }

    async fn list_run_messages(&self, _thread_id: &str, _run_id: &str) -> Result<Vec<RunMessage>> {
        let step = self.script.lock().unwrap().pop_front();
        let texts = match step {
            Some(Scripted::Messages(texts)) => texts,
            _ => vec!["Default reply."],
        };
        Ok(texts
            .into_iter()
            .map(|t| RunMessage {
                text: Some(t.to_string()),
            })
            .collect())
    }
}

/// Config pointing the document folders at `root` with fast polling
pub fn test_config(root: &Path, persisted_id: Option<&str>) -> Config {
    let mut cfg = Config::default();
    cfg.openai.api_key = "sk-test".to_string();
    cfg.documents.letters_dir = root.join("Letters");
    cfg.documents.ordinances_dir = root.join("Ordinances");
    cfg.vector_store.persisted_id = persisted_id.map(str::to_string);
    cfg.polling.interval_ms = 1;
    cfg.polling.run_timeout_secs = Some(5);
    cfg.polling.upload_timeout_secs = Some(5);
    cfg
}
