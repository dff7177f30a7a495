use std::time::Duration;

use async_trait::async_trait;
use hookwise_core::{CommentRef, ThreadRef};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::retry_policy::{AttemptFailure, RetryPolicy};
use crate::thread_api::{ThreadApi, ThreadApiError};

const RETRY_ATTEMPT_HEADER: &str = "x-hookwise-retry-attempt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, ThreadApiError> {
        let invalid =
            || ThreadApiError::InvalidConfig(format!("invalid repo '{raw}', expected owner/repo"));
        let (owner, name) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct GithubThreadApiConfig {
    pub api_base: String,
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubCommentResponse {
    id: u64,
}

/// Publishes status comments on GitHub issues and pull requests.
#[derive(Clone)]
pub struct GithubThreadApi {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry: RetryPolicy,
}

impl GithubThreadApi {
    pub fn new(config: GithubThreadApiConfig) -> Result<Self, ThreadApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("hookwise"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        let auth_value = reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
            ThreadApiError::InvalidConfig("invalid github authorization header".to_string())
        })?;
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                ThreadApiError::InvalidConfig(format!("failed to create github client: {error}"))
            })?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    async fn request_json<T, F>(
        &self,
        operation: &str,
        mut request_builder: F,
    ) -> Result<T, ThreadApiError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let failure = match request_builder()
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|error| ThreadApiError::Transport {
                            operation: operation.to_string(),
                            message: format!("failed to decode response: {error}"),
                        });
                }
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    AttemptFailure::from_response_parts(status, &headers, body)
                }
                Err(error) => AttemptFailure::Transport(error),
            };

            let Some(delay) = self.retry.delay_after(attempt, &failure) else {
                return Err(failure.into_error(operation));
            };
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                failure = ?failure,
                "retrying github request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ThreadApi for GithubThreadApi {
    async fn create_comment(
        &self,
        thread: ThreadRef,
        body: &str,
    ) -> Result<CommentRef, ThreadApiError> {
        let payload = json!({ "body": body });
        let created: GithubCommentResponse = self
            .request_json("create issue comment", || {
                self.http
                    .post(format!(
                        "{}/repos/{}/{}/issues/{}/comments",
                        self.api_base,
                        self.repo.owner,
                        self.repo.name,
                        thread.get()
                    ))
                    .json(&payload)
            })
            .await?;
        Ok(CommentRef(created.id))
    }

    async fn update_comment(&self, comment: CommentRef, body: &str) -> Result<(), ThreadApiError> {
        let payload = json!({ "body": body });
        let result: Result<GithubCommentResponse, ThreadApiError> = self
            .request_json("update issue comment", || {
                self.http
                    .patch(format!(
                        "{}/repos/{}/{}/issues/comments/{}",
                        self.api_base,
                        self.repo.owner,
                        self.repo.name,
                        comment.get()
                    ))
                    .json(&payload)
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(ThreadApiError::Rejected { status: 404, .. }) => {
                Err(ThreadApiError::CommentMissing(comment))
            }
            Err(error) => Err(error),
        }
    }
}
