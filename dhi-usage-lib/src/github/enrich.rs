use super::client::{ApiError, Client};
use super::pacing::or_cancelled;
use super::payloads::{CommitInfo, RepoDetails};
use super::search::SearchHit;
use chrono::{DateTime, Utc};
use core::fmt;
use core::time::Duration;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "    enrich";

/// Largest page the commit-history endpoint serves
const MAX_COMMITS_PAGE: &str = "100";

/// The commit believed to have introduced the matched reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoption {
    pub adopted_at: DateTime<Utc>,
    pub commit_sha: String,
    pub commit_url: String,
}

/// A search hit joined with its repository metadata
#[derive(Debug, Clone)]
pub struct EnrichedRepo {
    pub details: RepoDetails,
    pub hit: SearchHit,

    /// `None` when the lookup was skipped or failed
    pub adoption: Option<Adoption>,
}

#[derive(Debug)]
pub enum EnrichError {
    Api(ApiError),

    /// The history endpoint returned no commits touching the file
    NoCommits { path: String },

    Cancelled,
}

impl fmt::Display for EnrichError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{e}"),
            Self::NoCommits { path } => write!(f, "no commits found for file '{path}'"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl core::error::Error for EnrichError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Api(e) => Some(e),
            Self::NoCommits { .. } | Self::Cancelled => None,
        }
    }
}

impl From<ApiError> for EnrichError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

/// Fetches metadata and adoption provenance for one repository at a time
#[derive(Debug, Clone)]
pub struct Enricher {
    client: Client,
    repo_delay: Duration,
}

impl Enricher {
    #[must_use]
    pub const fn new(client: Client, repo_delay: Duration) -> Self {
        Self { client, repo_delay }
    }

    /// Pause the caller should observe between two repositories
    #[must_use]
    pub const fn repo_delay(&self) -> Duration {
        self.repo_delay
    }

    /// Enrich one search hit.
    ///
    /// A metadata failure is returned so the caller can skip the repository for this run.
    /// An adoption failure only leaves [`EnrichedRepo::adoption`] empty. When `adoption_known`
    /// is set the history lookup is skipped entirely, since a recorded adoption is never replaced.
    pub async fn enrich(
        &self,
        full_name: &str,
        hit: &SearchHit,
        adoption_known: bool,
        token: &CancellationToken,
    ) -> Result<EnrichedRepo, EnrichError> {
        let details = self.details(full_name, token).await?;

        let adoption = if adoption_known {
            None
        } else {
            match self.adoption(full_name, &hit.file_path, token).await {
                Ok(adoption) => Some(adoption),
                Err(EnrichError::Cancelled) => return Err(EnrichError::Cancelled),
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Could not resolve adoption for '{full_name}': {e}");
                    None
                }
            }
        };

        Ok(EnrichedRepo {
            details,
            hit: hit.clone(),
            adoption,
        })
    }

    /// Fetch repository metadata, retrying once after the cooldown if throttled
    pub async fn details(&self, full_name: &str, token: &CancellationToken) -> Result<RepoDetails, EnrichError> {
        let path = format!("repos/{full_name}");
        or_cancelled(token, self.client.get_json_retrying::<RepoDetails>(&path, &[]))
            .await
            .ok_or(EnrichError::Cancelled)?
            .map_err(EnrichError::Api)
    }

    /// Resolve the commit that introduced `file_path`.
    ///
    /// Commits come back newest first. A one-item page without a next link means the file
    /// has a single commit. Otherwise the last entry of a single maximum-size page is taken,
    /// so files with a longer history resolve to the oldest commit within that page only.
    pub async fn adoption(&self, full_name: &str, file_path: &str, token: &CancellationToken) -> Result<Adoption, EnrichError> {
        let path = format!("repos/{full_name}/commits");

        let first = self.commits_page(&path, file_path, "1", token).await?;
        let Some(newest) = first.commits.into_iter().next() else {
            return Err(EnrichError::NoCommits { path: file_path.to_string() });
        };

        if !first.has_next_page {
            return adoption_from(newest, file_path);
        }

        let page = self.commits_page(&path, file_path, MAX_COMMITS_PAGE, token).await?;
        log::trace!(
            target: LOG_TARGET,
            "'{full_name}': {} commits touch '{file_path}' within one page (more exist: {})",
            page.commits.len(),
            page.has_next_page
        );

        match page.commits.into_iter().last() {
            Some(oldest) => adoption_from(oldest, file_path),
            None => Err(EnrichError::NoCommits { path: file_path.to_string() }),
        }
    }

    async fn commits_page(
        &self,
        path: &str,
        file_path: &str,
        per_page: &str,
        token: &CancellationToken,
    ) -> Result<CommitsPage, EnrichError> {
        let resp = or_cancelled(token, self.client.get_retrying(path, &[("path", file_path), ("per_page", per_page)]))
            .await
            .ok_or(EnrichError::Cancelled)??;

        Ok(CommitsPage {
            commits: resp.json()?,
            has_next_page: resp.has_next_page,
        })
    }
}

struct CommitsPage {
    commits: Vec<CommitInfo>,
    has_next_page: bool,
}

fn adoption_from(commit: CommitInfo, file_path: &str) -> Result<Adoption, EnrichError> {
    let Some(adopted_at) = commit.date() else {
        return Err(EnrichError::NoCommits { path: file_path.to_string() });
    };

    Ok(Adoption {
        adopted_at,
        commit_sha: commit.sha,
        commit_url: commit.html_url,
    })
}
