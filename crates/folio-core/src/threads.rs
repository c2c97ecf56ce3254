//! Conversation thread manager.

use crate::backend::RagBackend;
use crate::error::RagResult;
use std::sync::Arc;

/// Maps a client conversation handle to a backend thread that is usable right now.
pub struct ThreadManager {
    backend: Arc<dyn RagBackend>,
}

impl ThreadManager {
    pub fn new(backend: Arc<dyn RagBackend>) -> Self {
        Self { backend }
    }

    /// Return a handle safe for the next message.
    ///
    /// No handle: create one. A handle the backend no longer knows: create a fresh one
    /// silently. Any other lookup failure, or a failed create, propagates.
    pub async fn ensure_thread(&self, thread_id: Option<&str>) -> RagResult<String> {
        let existing = thread_id.map(str::trim).filter(|id| !id.is_empty());
        let Some(id) = existing else {
            let created = self.backend.create_thread().await?;
            tracing::info!(target: "folio::rag", thread_id = %created, "Created new thread");
            return Ok(created);
        };

        match self.backend.retrieve_thread(id).await {
            Ok(()) => Ok(id.to_string()),
            Err(e) if e.is_not_found() => {
                let created = self.backend.create_thread().await?;
                tracing::warn!(
                    target: "folio::rag",
                    stale = %id,
                    thread_id = %created,
                    "Thread not found, created a new one"
                );
                Ok(created)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalRagBackend;

    #[tokio::test]
    async fn creates_when_absent_or_blank() {
        let backend = Arc::new(LocalRagBackend::new());
        let manager = ThreadManager::new(backend.clone());
        let a = manager.ensure_thread(None).await.unwrap();
        let b = manager.ensure_thread(Some("  ")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.threads_created(), 2);
    }

    #[tokio::test]
    async fn reuses_live_thread() {
        let backend = Arc::new(LocalRagBackend::new());
        let manager = ThreadManager::new(backend.clone());
        let id = manager.ensure_thread(None).await.unwrap();
        assert_eq!(manager.ensure_thread(Some(&id)).await.unwrap(), id);
        assert_eq!(backend.threads_created(), 1);
    }

    #[tokio::test]
    async fn recreates_stale_thread() {
        let backend = Arc::new(LocalRagBackend::new());
        let manager = ThreadManager::new(backend.clone());
        let id = manager.ensure_thread(None).await.unwrap();
        backend.forget_thread(&id);
        let fresh = manager.ensure_thread(Some(&id)).await.unwrap();
        assert_ne!(fresh, id);
        assert!(backend.thread_len(&fresh).is_some());
    }
}
