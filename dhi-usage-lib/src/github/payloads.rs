//! Wire shapes of the GitHub responses we consume, restricted to the fields we need.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Response of `GET /search/code`
#[derive(Debug, Deserialize)]
pub struct CodeSearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<CodeSearchItem>,
}

/// A single code search hit
#[derive(Debug, Deserialize)]
pub struct CodeSearchItem {
    pub path: String,
    pub repository: CodeSearchRepository,
}

#[derive(Debug, Deserialize)]
pub struct CodeSearchRepository {
    pub full_name: String,
    pub html_url: String,
}

/// Response of `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepoDetails {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
}

/// An element of `GET /repos/{owner}/{repo}/commits`
#[derive(Debug, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub commit: CommitBody,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitBody {
    pub author: Option<CommitSignature>,
    pub committer: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
pub struct CommitSignature {
    pub date: DateTime<Utc>,
}

impl CommitInfo {
    /// The authoring date, falling back to the commit date when the author block is missing
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.commit
            .author
            .as_ref()
            .or(self.commit.committer.as_ref())
            .map(|sig| sig.date)
    }
}
