//! The GitHub REST client.

use std::time::Duration;

use async_trait::async_trait;
use migration::{
    CommentDescriptor, CreatedIssue, IssueDescriptor, IssueNumber, OrganizationName, RemoteClient,
    RemoteError, RepositoryDescriptor, RepositoryName, RepositoryPath, RetryPolicy,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::wire::{
    CommentWire, CreateCommentRequest, CreateIssueRequest, CreateRepositoryRequest,
    CreatedIssueWire, ErrorWire, IssueWire, RepositoryWire, UpdateIssueStateRequest,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The client could not be constructed.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("access token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// [`RemoteClient`] over the GitHub REST v3 API.
///
/// Listing calls page through results 100 at a time. Transient failures are
/// retried up to three attempts; writes are only retried when the platform
/// rejected them outright with 429, because a gateway error on a write may
/// still have created the resource.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    /// Creates a client for `api_url` (no trailing slash required)
    /// authenticating with `token`.
    pub fn new(api_url: &str, token: &str) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|_| ClientBuildError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("org-migrate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// Sends one request, retrying transient failures.
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, RemoteError> {
        let is_write = method != Method::GET;
        let mut attempt = 1;
        loop {
            let mut request = self.http.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => error_from_response(response).await,
                Err(e) => RemoteError::network(e.to_string()),
            };

            match retry_delay(&error, attempt, is_write) {
                Some(delay) => {
                    warn!(
                        %method,
                        url,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "transient API failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        decode(response).await
    }

    async fn write_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let response = self.send(method, url, Some(body)).await?;
        decode(response).await
    }

    /// Fetches every page of a listing endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<Vec<T>, RemoteError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let url = format!("{}?{query}per_page={PER_PAGE}&page={page}", self.url(path));
            let batch: Vec<T> = self.get_json(&url).await?;
            let fetched = batch.len();
            items.extend(batch);
            debug!(path, page, fetched, "fetched page");
            if fetched < PER_PAGE {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl RemoteClient for GitHubClient {
    #[instrument(skip(self))]
    async fn list_repositories(
        &self,
        org: &OrganizationName,
    ) -> Result<Vec<RepositoryDescriptor>, RemoteError> {
        let repos: Vec<RepositoryWire> = self
            .get_all(&format!("/orgs/{org}/repos"), "type=all&")
            .await?;
        Ok(repos
            .into_iter()
            .filter_map(RepositoryWire::into_descriptor)
            .collect())
    }

    #[instrument(skip(self, description))]
    async fn create_repository(
        &self,
        org: &OrganizationName,
        name: &RepositoryName,
        private: bool,
        description: &str,
    ) -> Result<RepositoryDescriptor, RemoteError> {
        let request = CreateRepositoryRequest {
            name: name.as_str(),
            private,
            description,
        };
        let created: RepositoryWire = self
            .write_json(Method::POST, &self.url(&format!("/orgs/{org}/repos")), &request)
            .await?;
        created
            .into_descriptor()
            .ok_or_else(|| RemoteError::network("created repository has an empty name"))
    }

    /// Lists all issues (open and closed) in ascending number order. Pull
    /// requests share the issue number space and are left out; their numbers
    /// become placeholders.
    #[instrument(skip(self), fields(repo = %repo))]
    async fn list_issues(&self, repo: &RepositoryPath) -> Result<Vec<IssueDescriptor>, RemoteError> {
        let wires: Vec<IssueWire> = self
            .get_all(
                &format!("/repos/{}/{}/issues", repo.owner, repo.name),
                "state=all&sort=created&direction=asc&",
            )
            .await?;
        let total = wires.len();
        let mut issues: Vec<IssueDescriptor> = wires
            .into_iter()
            .filter(|w| !w.is_pull_request())
            .map(IssueWire::into_descriptor)
            .collect();
        issues.sort_by_key(|i| i.number);
        debug!(issues = issues.len(), pull_requests = total - issues.len(), "listed issues");
        Ok(issues)
    }

    #[instrument(skip(self, body), fields(repo = %repo))]
    async fn create_issue(
        &self,
        repo: &RepositoryPath,
        title: &str,
        body: &str,
    ) -> Result<CreatedIssue, RemoteError> {
        let url = self.url(&format!("/repos/{}/{}/issues", repo.owner, repo.name));
        let created: CreatedIssueWire = self
            .write_json(Method::POST, &url, &CreateIssueRequest { title, body })
            .await?;
        Ok(created.into())
    }

    #[instrument(skip(self), fields(repo = %repo, number = %number))]
    async fn close_issue(&self, repo: &RepositoryPath, number: IssueNumber) -> Result<(), RemoteError> {
        let url = self.url(&format!("/repos/{}/{}/issues/{number}", repo.owner, repo.name));
        let request = UpdateIssueStateRequest { state: "closed" };
        self.send(Method::PATCH, &url, Some(&request)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = %repo, number = %number))]
    async fn list_issue_comments(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
    ) -> Result<Vec<CommentDescriptor>, RemoteError> {
        let comments: Vec<CommentWire> = self
            .get_all(
                &format!("/repos/{}/{}/issues/{number}/comments", repo.owner, repo.name),
                "",
            )
            .await?;
        Ok(comments.into_iter().map(CommentDescriptor::from).collect())
    }

    #[instrument(skip(self, body), fields(repo = %repo, number = %number))]
    async fn create_issue_comment(
        &self,
        repo: &RepositoryPath,
        number: IssueNumber,
        body: &str,
    ) -> Result<(), RemoteError> {
        let url = self.url(&format!(
            "/repos/{}/{}/issues/{number}/comments",
            repo.owner, repo.name
        ));
        self.send(Method::POST, &url, Some(&CreateCommentRequest { body }))
            .await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let status = response.status().as_u16();
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::http(status, format!("malformed response body: {e}")))
}

async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    remote_error(status, retry_after.as_deref(), &body)
}

/// Builds the error for a non-success response: the status reason, then the
/// API's own `message` when the body carries one.
fn remote_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> RemoteError {
    let mut message = status.canonical_reason().unwrap_or("unknown status").to_owned();
    if let Some(detail) = serde_json::from_str::<ErrorWire>(body)
        .ok()
        .and_then(|e| e.message)
    {
        message.push_str(" - ");
        message.push_str(&detail);
    }

    let error = RemoteError::http(status.as_u16(), message);
    match retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) => error.with_retry_after(Duration::from_secs(secs)),
        None => error,
    }
}

/// Decides whether attempt number `attempt` should be followed by another,
/// and after how long.
fn retry_delay(error: &RemoteError, attempt: u32, is_write: bool) -> Option<Duration> {
    if attempt >= MAX_ATTEMPTS {
        return None;
    }
    if is_write && error.status != Some(429) {
        return None;
    }
    match error.retry_policy() {
        RetryPolicy::Retryable { after } => Some(after.unwrap_or(BASE_BACKOFF * attempt)),
        RetryPolicy::NonRetryable => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_is_appended_to_the_reason() {
        let error = remote_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            None,
            r#"{"message":"Repository creation failed.","errors":[]}"#,
        );
        assert_eq!(error.status, Some(422));
        assert_eq!(error.message, "Unprocessable Entity - Repository creation failed.");
        assert!(error.is_already_exists());
    }

    #[test]
    fn non_json_body_keeps_only_the_reason() {
        let error = remote_error(StatusCode::BAD_GATEWAY, None, "<html>bad gateway</html>");
        assert_eq!(error.message, "Bad Gateway");
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn retry_after_header_is_parsed() {
        let error = remote_error(StatusCode::TOO_MANY_REQUESTS, Some(" 17 "), "{}");
        assert_eq!(error.retry_after, Some(Duration::from_secs(17)));
        assert_eq!(retry_delay(&error, 1, true), Some(Duration::from_secs(17)));
    }

    #[test]
    fn reads_back_off_on_gateway_errors() {
        let error = RemoteError::http(503, "Service Unavailable");
        assert_eq!(retry_delay(&error, 1, false), Some(BASE_BACKOFF));
        assert_eq!(retry_delay(&error, 2, false), Some(BASE_BACKOFF * 2));
        assert_eq!(retry_delay(&error, MAX_ATTEMPTS, false), None);
    }

    #[test]
    fn writes_are_not_retried_after_gateway_errors() {
        assert_eq!(retry_delay(&RemoteError::http(502, "Bad Gateway"), 1, true), None);
        assert_eq!(retry_delay(&RemoteError::network("connection reset"), 1, true), None);
        assert_eq!(
            retry_delay(&RemoteError::network("connection reset"), 1, false),
            Some(BASE_BACKOFF)
        );
    }

    #[test]
    fn permission_failures_are_final() {
        let error = RemoteError::http(403, "Forbidden");
        assert_eq!(retry_delay(&error, 1, false), None);
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/", "abc").unwrap();
        assert_eq!(client.url("/orgs/x/repos"), "https://ghe.example.com/api/v3/orgs/x/repos");
    }

    #[test]
    fn control_characters_in_token_are_rejected() {
        assert!(matches!(
            GitHubClient::new(DEFAULT_API_URL, "abc\ndef"),
            Err(ClientBuildError::InvalidToken)
        ));
    }
}
