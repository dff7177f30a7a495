use std::collections::HashMap;
use std::sync::Arc;

use hookwise_comments::{ThreadApi, ThreadApiError};
use hookwise_core::{CommentRef, ThreadRef};
use hookwise_store::IssueIndex;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ReconcileError;

/// Keeps exactly one visible summary comment per thread.
///
/// Updates the comment recorded in the issue index when there is one and
/// only creates a new comment when the thread has none, or when the recorded
/// comment was deleted. Publications to one thread are serialized so two
/// concurrent first publishes cannot both create a comment.
#[derive(Clone)]
pub struct SummaryCommentPublisher {
    threads: Arc<dyn IssueIndex>,
    api: Arc<dyn ThreadApi>,
    inflight: Arc<Mutex<HashMap<ThreadRef, Arc<Mutex<()>>>>>,
}

impl SummaryCommentPublisher {
    pub fn new(threads: Arc<dyn IssueIndex>, api: Arc<dyn ThreadApi>) -> Self {
        Self {
            threads,
            api,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_thread(&self, thread: ThreadRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(thread)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Publishes `body` as the thread's summary comment.
    pub async fn publish_or_update(
        &self,
        thread: ThreadRef,
        body: &str,
    ) -> Result<CommentRef, ReconcileError> {
        let _guard = self.lock_thread(thread).await;
        // The previous holder may have attached a comment; read it under the lock.
        let entry = self.threads.ensure(thread).await?;
        if let Some(comment) = entry.summary_comment_ref {
            match self.api.update_comment(comment, body).await {
                Ok(()) => return Ok(comment),
                Err(ThreadApiError::CommentMissing(missing)) => {
                    tracing::warn!(
                        thread = %thread,
                        comment = %missing,
                        "summary comment is gone, creating a new one"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
        self.create_and_attach(thread, body).await
    }

    async fn create_and_attach(
        &self,
        thread: ThreadRef,
        body: &str,
    ) -> Result<CommentRef, ReconcileError> {
        let comment = self.api.create_comment(thread, body).await?;
        self.threads.attach_summary_comment(thread, comment).await?;
        Ok(comment)
    }
}
