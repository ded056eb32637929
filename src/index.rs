//! Guarantees a remote vector store exists for the session, reusing a
//! persisted one when it can still be fetched.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::assistant_api::{BatchStatus, VectorStoreApi, VectorStoreHandle};
use crate::config::{DocumentsConfig, VectorStoreConfig};
use crate::documents::resolve_document_set;
use crate::error::{AduChatError, Result};
use crate::models::StatusLine;
use crate::polling::{PollOptions, poll_until};

/// Result of [`IndexManager::ensure_index`]
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub store: VectorStoreHandle,
    pub reused: bool,
    pub uploaded: Vec<PathBuf>,
    pub status: Vec<StatusLine>,
}

pub struct IndexManager<'a> {
    documents: &'a DocumentsConfig,
    store: &'a VectorStoreConfig,
    poll: PollOptions,
}

impl<'a> IndexManager<'a> {
    pub fn new(documents: &'a DocumentsConfig, store: &'a VectorStoreConfig, poll: PollOptions) -> Self {
        Self {
            documents,
            store,
            poll,
        }
    }

    pub async fn ensure_index(
        &self,
        api: &dyn VectorStoreApi,
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        let mut status = Vec::new();

        if let Some(id) = self.store.persisted_id.as_deref() {
            match api.retrieve_vector_store(id).await {
                Ok(store) => {
                    tracing::info!(vector_store_id = %store.id, "Reusing persisted vector store");
                    status.push(StatusLine::info(format!(
                        "Loaded persisted vector store ID from configuration: {}",
                        store.id
                    )));
                    return Ok(IndexOutcome {
                        store,
                        reused: true,
                        uploaded: Vec::new(),
                        status,
                    });
                }
                Err(e) => {
                    tracing::warn!(vector_store_id = %id, "Failed to load persisted vector store: {}", e);
                    status.push(StatusLine::warn(format!(
                        "Failed to load persisted vector store. Creating a new one. Error: {e}"
                    )));
                }
            }
        }

        self.create_and_upload(api, cancel, status).await
    }

    async fn create_and_upload(
        &self,
        api: &dyn VectorStoreApi,
        cancel: &CancellationToken,
        mut status: Vec<StatusLine>,
    ) -> Result<IndexOutcome> {
        let store = api.create_vector_store(&self.store.name).await?;
        tracing::info!(vector_store_id = %store.id, name = %self.store.name, "Created vector store");

        let paths = resolve_document_set(
            &self.documents.letters_dir,
            &self.documents.ordinances_dir,
            &self.documents.statewide_file,
        );

        if paths.is_empty() {
            tracing::warn!("No PDF files found; vector store will be empty");
            status.push(StatusLine::warn(
                "No PDF files found in the specified directories.",
            ));
        } else {
            let mut file_ids = Vec::with_capacity(paths.len());
            for path in &paths {
                let file = api.upload_file(path).await?;
                tracing::debug!(file_id = %file.id, path = %path.display(), "Uploaded file");
                file_ids.push(file.id);
            }

            let batch = api.create_file_batch(&store.id, &file_ids).await?;
            let batch_id = batch.id.clone();
            let store_id = store.id.clone();
            let finished = if batch.status == BatchStatus::InProgress {
                poll_until("file batch indexing", self.poll, cancel, || {
                    let batch_id = batch_id.clone();
                    let store_id = store_id.clone();
                    async move {
                        let batch = api.retrieve_file_batch(&store_id, &batch_id).await?;
                        Ok((batch.status != BatchStatus::InProgress).then_some(batch.status))
                    }
                })
                .await?
            } else {
                batch.status
            };

            if finished != BatchStatus::Completed {
                return Err(AduChatError::BatchFailed {
                    status: format!("{finished:?}").to_lowercase(),
                });
            }

            let names: Vec<String> = paths
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            tracing::info!(count = names.len(), vector_store_id = %store.id, "Indexed documents");
            status.push(StatusLine::info(format!("Uploaded files: {}", names.join(", "))));
        }

        status.push(StatusLine::info(format!(
            "New vector store ID (set VECTOR_STORE_ID to reuse it): {}",
            store.id
        )));

        Ok(IndexOutcome {
            store,
            reused: false,
            uploaded: paths,
            status,
        })
    }
}
