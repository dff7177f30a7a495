use async_trait::async_trait;
use hookwise_core::{CommentRef, ThreadRef};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadApiError {
    /// The referenced comment no longer exists on the thread.
    #[error("comment {0} no longer exists")]
    CommentMissing(CommentRef),
    #[error("thread api {operation} rejected with status {status}: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("thread api {operation} failed: {message}")]
    Transport { operation: String, message: String },
    #[error("invalid thread api configuration: {0}")]
    InvalidConfig(String),
}

/// Collaboration-thread operations needed to publish status comments.
#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn create_comment(&self, thread: ThreadRef, body: &str)
        -> Result<CommentRef, ThreadApiError>;

    async fn update_comment(&self, comment: CommentRef, body: &str) -> Result<(), ThreadApiError>;
}
