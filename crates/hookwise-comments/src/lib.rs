//! Status comment rendering and the collaboration-thread transport.
//!
//! Rendering is pure: a record plus command sections in, markdown out. The
//! [`ThreadApi`] trait is the only seam that talks to the outside world;
//! [`GithubThreadApi`] implements it against the GitHub issues API.

pub mod comment_render;
pub mod error_comment;
pub mod github_thread_api;
pub mod retry_policy;
pub mod thread_api;

pub use comment_render::{
    entry_marker, render_comment, ENTRY_MARKER_PREFIX, ENTRY_MARKER_SUFFIX, MAX_COMMENT_CHARS,
};
pub use error_comment::render_internal_error_comment;
pub use github_thread_api::{GithubThreadApi, GithubThreadApiConfig, RepoRef};
pub use retry_policy::RetryPolicy;
pub use thread_api::{ThreadApi, ThreadApiError};
