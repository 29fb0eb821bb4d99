//! GitHub REST surface used for pull requests and labels.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runner::AgentType;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "sandbox-agent";
const API_VERSION: &str = "2022-11-28";

/// Repository identifier in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parses `owner/repo` or a GitHub HTTPS/SSH remote URL.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let path = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .or_else(|| trimmed.strip_prefix("git@github.com:"))
            .or_else(|| trimmed.strip_prefix("ssh://git@github.com/"))
            .unwrap_or(trimmed);

        let mut parts = path.split('/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        if owner.is_empty() || name.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Label to ensure on the repository and attach to new pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelOptions {
    pub name: String,
    /// Hex color without the leading `#`.
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl LabelOptions {
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: description.into(),
        }
    }

    /// Default label for pull requests opened by `agent`.
    pub fn for_agent(agent: AgentType, label_name: &str) -> Self {
        let color = match agent {
            AgentType::Claude => "ff6b35",
            AgentType::Codex => "10a37f",
            AgentType::Gemini => "4285f4",
            AgentType::OpenCode => "6f42c1",
        };
        Self::new(
            label_name,
            color,
            format!("Generated by the {} agent", agent),
        )
    }
}

/// Body of `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: Option<String>,
}

/// Subset of the GitHub pull request object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubPullRequest {
    pub id: u64,
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub mergeable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubLabel {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

/// Body of `PUT /repos/{owner}/{repo}/pulls/{number}/merge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct MergeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub merge_method: MergeMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub sha: String,
    pub merged: bool,
    pub message: String,
}

/// GitHub operations needed to publish agent changes.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<GitHubPullRequest>;

    /// Looks up a label; `Ok(None)` when GitHub answers 404.
    async fn get_label(&self, repo: &RepoSlug, name: &str) -> Result<Option<GitHubLabel>>;

    async fn create_label(&self, repo: &RepoSlug, label: &LabelOptions) -> Result<GitHubLabel>;

    async fn add_labels(&self, repo: &RepoSlug, issue_number: u64, labels: &[String])
        -> Result<()>;

    async fn merge_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        options: &MergeOptions,
    ) -> Result<MergeResult>;
}

/// Maps a non-2xx GitHub response to an error.
pub fn status_error(status: u16, body: &str, context: &str) -> Error {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string());

    let message = match status {
        404 => format!("{}: not found (check the repository name and token scopes)", context),
        405 => format!(
            "{}: pull request is not mergeable (conflicts or failing requirements)",
            context
        ),
        422 => format!("{}: validation failed: {}", context, detail),
        _ => format!("{}: request failed with status {}: {}", context, status, detail),
    };
    Error::GitHub { status, message }
}

/// [`GitHubApi`] backed by the REST API over `reqwest`.
#[derive(Clone)]
pub struct RestGitHub {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl RestGitHub {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Override the base URL (useful for GitHub Enterprise or a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.request_url(method, format!("{}{}", self.base_url, path))
    }

    /// Authenticated request with the API version headers every call carries.
    fn request_url(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// `/repos/{repo}/labels/{name}` with `name` percent-encoded as one segment.
    fn label_url(&self, repo: &RepoSlug, name: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{}/repos/{}/labels/", self.base_url, repo))
            .map_err(|e| Error::Config(format!("invalid GitHub API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config("GitHub API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn checked(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body, context))
    }
}

#[async_trait]
impl GitHubApi for RestGitHub {
    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<GitHubPullRequest> {
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{}/pulls", repo))
            .json(request)
            .send()
            .await?;
        let response = Self::checked(response, "create pull request").await?;
        Ok(response.json().await?)
    }

    async fn get_label(&self, repo: &RepoSlug, name: &str) -> Result<Option<GitHubLabel>> {
        let url = self.label_url(repo, name)?;
        let response = self
            .request_url(reqwest::Method::GET, url)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::checked(response, "get label").await?;
        Ok(Some(response.json().await?))
    }

    async fn create_label(&self, repo: &RepoSlug, label: &LabelOptions) -> Result<GitHubLabel> {
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{}/labels", repo))
            .json(label)
            .send()
            .await?;
        let response = Self::checked(response, "create label").await?;
        Ok(response.json().await?)
    }

    async fn add_labels(
        &self,
        repo: &RepoSlug,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/issues/{}/labels", repo, issue_number),
            )
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await?;
        Self::checked(response, "add labels").await?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        options: &MergeOptions,
    ) -> Result<MergeResult> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{}/pulls/{}/merge", repo, number),
            )
            .json(options)
            .send()
            .await?;
        let response = Self::checked(response, "merge pull request").await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup_sends_api_version_header() {
        let client = RestGitHub::new("ghp_x").with_base_url("https://ghe.example.com/api/v3/");
        let repo = RepoSlug::parse("acme/widgets").unwrap();

        let url = client.label_url(&repo, "needs review/agent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/acme/widgets/labels/needs%20review%2Fagent"
        );

        let request = client
            .request_url(reqwest::Method::GET, url)
            .build()
            .unwrap();
        let headers = request.headers();
        assert_eq!(headers["X-GitHub-Api-Version"], API_VERSION);
        assert_eq!(headers[reqwest::header::ACCEPT], "application/vnd.github+json");
        assert_eq!(headers[reqwest::header::AUTHORIZATION], "Bearer ghp_x");
    }

    #[test]
    fn parses_slug_forms() {
        let expected = RepoSlug {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
        };
        for input in [
            "acme/widgets",
            "https://github.com/acme/widgets",
            "https://github.com/acme/widgets.git",
            "git@github.com:acme/widgets.git",
            "ssh://git@github.com/acme/widgets/",
        ] {
            assert_eq!(RepoSlug::parse(input), Some(expected.clone()), "{}", input);
        }
        assert_eq!(expected.to_string(), "acme/widgets");
    }

    #[test]
    fn rejects_malformed_slugs() {
        for input in ["", "acme", "acme/", "/widgets", "a/b/c"] {
            assert_eq!(RepoSlug::parse(input), None, "{}", input);
        }
    }

    #[test]
    fn status_errors_are_specific() {
        match status_error(404, "", "create pull request") {
            Error::GitHub { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected {:?}", other),
        }

        match status_error(405, "{}", "merge pull request") {
            Error::GitHub { message, .. } => assert!(message.contains("not mergeable")),
            other => panic!("unexpected {:?}", other),
        }

        match status_error(422, r#"{"message":"A pull request already exists"}"#, "create") {
            Error::GitHub { message, .. } => {
                assert!(message.contains("validation failed"));
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected {:?}", other),
        }

        match status_error(500, "boom", "create") {
            Error::GitHub { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("status 500"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pull_request_deserializes_refs() {
        let pr: GitHubPullRequest = serde_json::from_str(
            r#"{
                "id": 1, "number": 7, "state": "open",
                "html_url": "https://github.com/acme/widgets/pull/7",
                "title": "Add feature",
                "user": {"login": "bot"},
                "head": {"ref": "codex/feature", "sha": "abc"},
                "base": {"ref": "main"},
                "merged": false, "mergeable": null,
                "extra": "ignored"
            }"#,
        )
        .unwrap();

        assert_eq!(pr.head.ref_name, "codex/feature");
        assert_eq!(pr.base.ref_name, "main");
        assert_eq!(pr.user.unwrap().login, "bot");
        assert_eq!(pr.mergeable, None);
    }

    #[test]
    fn merge_options_serialize_sparse() {
        let value = serde_json::to_value(MergeOptions::default()).unwrap();
        assert_eq!(value, serde_json::json!({"merge_method": "squash"}));
    }

    #[test]
    fn agent_label_defaults() {
        let label = LabelOptions::for_agent(AgentType::Codex, "codex");
        assert_eq!(label.name, "codex");
        assert_eq!(label.color, "10a37f");
        assert!(label.description.contains("codex"));
    }
}
