use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assistant_api::AssistantBackend;
use crate::config::Config;
use crate::error::Result;
use crate::models::Role;
use crate::session::ChatSession;

pub type SharedSession = Arc<Mutex<ChatSession>>;

struct SessionEntry {
    session: SharedSession,
    cancel: CancellationToken,
    last_used: Instant,
}

/// Live chat sessions keyed by the id handed to the browser.
///
/// Each session sits behind its own mutex so interaction cycles of one user
/// run one at a time while other users proceed independently. Sessions left
/// unused for longer than `server.session_idle_secs` are ended.
pub struct SessionRegistry {
    backend: Arc<dyn AssistantBackend>,
    config: Arc<Config>,
    shutdown: CancellationToken,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        config: Arc<Config>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backend,
            config,
            shutdown,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// Look up `id`, or start a new session seeded with `role`.
    /// The bool is true when a session was created.
    pub async fn get_or_start(
        &self,
        id: Option<Uuid>,
        role: Role,
    ) -> Result<(Uuid, SharedSession, bool)> {
        if let Some(id) = id {
            if let Some(session) = self.get(&id).await {
                return Ok((id, session, false));
            }
            tracing::debug!(session_id = %id, "Unknown session id, starting a new session");
        }

        self.evict_idle().await;

        let cancel = self.shutdown.child_token();
        let session = ChatSession::start(
            self.backend.clone(),
            self.config.clone(),
            role,
            cancel.clone(),
        )
        .await?;
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session: shared.clone(),
                cancel,
                last_used: Instant::now(),
            },
        );
        Ok((id, shared, true))
    }

    /// Tear a session down. Returns false when the id was unknown.
    pub async fn end(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(entry) => {
                Self::finish(entry).await;
                true
            }
            None => false,
        }
    }

    /// End every session idle for longer than the configured limit.
    /// Returns how many were ended.
    pub async fn evict_idle(&self) -> usize {
        let Some(limit) = self.config.session_idle() else {
            return 0;
        };

        let expired: Vec<(Uuid, SessionEntry)> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() >= limit)
                .map(|(id, _)| *id)
                .collect();
            stale
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = expired.len();
        for (id, entry) in expired {
            tracing::info!(session_id = %id, "Ending idle chat session");
            Self::finish(entry).await;
        }
        count
    }

    /// Sweep idle sessions periodically until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let limit = self.config.session_idle()?;
        let every = (limit / 4).max(Duration::from_secs(1));
        let registry = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = registry.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let ended = registry.evict_idle().await;
                        if ended > 0 {
                            tracing::debug!(ended, "Idle session sweep");
                        }
                    }
                }
            }
        }))
    }

    async fn finish(entry: SessionEntry) {
        // cancel before locking so an in-flight poll releases the mutex
        entry.cancel.cancel();
        entry.session.lock().await.end();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
