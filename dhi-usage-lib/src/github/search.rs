use super::client::{ApiError, Client};
use super::pacing::{or_cancelled, pause};
use super::payloads::CodeSearchResponse;
use core::fmt;
use core::time::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "    search";

/// A named code-search expression. The name doubles as the match category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery {
    pub name: &'static str,
    pub query: &'static str,
}

/// Queries tuned to find real `dhi.io` image references rather than lookalikes such as `siddhi.io`.
///
/// Order matters: the first query to match a repository determines its category.
pub const DEFAULT_QUERIES: &[SearchQuery] = &[
    // `filename:` is a substring match, so this also catches Dockerfile.dev, app.Dockerfile, ...
    SearchQuery {
        name: "Dockerfiles",
        query: r#""FROM dhi.io" filename:Dockerfile"#,
    },
    // The `image: ` prefix keeps URLs like siddhi.io out
    SearchQuery {
        name: "YAML/K8s",
        query: r#""image: dhi.io/" language:YAML"#,
    },
    SearchQuery {
        name: "GitHub Actions",
        query: r#""dhi.io/" path:.github/workflows"#,
    },
];

/// Where a repository was first matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file_path: String,
    pub file_url: String,
    pub category: String,
}

/// Unique repositories keyed by full name
pub type SearchHits = BTreeMap<String, SearchHit>;

/// Pagination and pacing knobs for the code-search endpoint
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub page_size: u32,

    /// The provider refuses to serve results past this page
    pub max_pages: u32,

    /// Delay between pages of one query and between queries
    pub page_delay: Duration,

    /// How many times one throttled page is retried after the cooldown
    pub max_rate_limit_retries: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10,
            // code search allows ~10 requests per minute
            page_delay: Duration::from_secs(6),
            max_rate_limit_retries: 3,
        }
    }
}

/// How a completed sweep ended
#[derive(Debug)]
pub enum SearchOutcome {
    /// Every query ran to its natural end
    Complete(SearchHits),

    /// The caller cancelled; the hits gathered so far are returned
    Cancelled(SearchHits),
}

impl SearchOutcome {
    #[must_use]
    pub const fn hits(&self) -> &SearchHits {
        match self {
            Self::Complete(hits) | Self::Cancelled(hits) => hits,
        }
    }

    #[must_use]
    pub fn into_hits(self) -> SearchHits {
        match self {
            Self::Complete(hits) | Self::Cancelled(hits) => hits,
        }
    }
}

/// A sweep aborted by an unrecoverable API error
#[derive(Debug)]
pub struct SearchFailure {
    pub query: &'static str,
    pub page: u32,
    pub partial: SearchHits,
    pub error: ApiError,
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "searching '{}' (page {}): {}", self.query, self.page, self.error)
    }
}

impl core::error::Error for SearchFailure {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs the fixed query set and merges hits into a deduplicated map
#[derive(Debug, Clone)]
pub struct SearchAggregator {
    client: Client,
    queries: Vec<SearchQuery>,
    settings: SearchSettings,
}

impl SearchAggregator {
    #[must_use]
    pub fn new(client: Client, queries: &[SearchQuery], settings: SearchSettings) -> Self {
        Self {
            client,
            queries: queries.to_vec(),
            settings,
        }
    }

    /// Run every query in declared order and return the unique repositories found
    pub async fn search_all(&self, token: &CancellationToken) -> Result<SearchOutcome, SearchFailure> {
        let mut hits = SearchHits::new();

        for (index, sq) in self.queries.iter().enumerate() {
            if index > 0 && !pause(token, self.settings.page_delay).await {
                return Ok(SearchOutcome::Cancelled(hits));
            }

            log::info!(target: LOG_TARGET, "Starting search: {}", sq.name);
            if !self.run_query(sq, &mut hits, token).await? {
                log::info!(target: LOG_TARGET, "Search cancelled with {} unique repositories gathered", hits.len());
                return Ok(SearchOutcome::Cancelled(hits));
            }
        }

        log::info!(target: LOG_TARGET, "Found {} unique repositories", hits.len());
        Ok(SearchOutcome::Complete(hits))
    }

    /// Page through one query. Returns `Ok(false)` if cancelled.
    async fn run_query(&self, sq: &SearchQuery, hits: &mut SearchHits, token: &CancellationToken) -> Result<bool, SearchFailure> {
        let mut page = 1u32;
        let mut fetched = 0u64;

        loop {
            let Some(resp) = self.fetch_page(sq, page, hits, token).await? else {
                return Ok(false);
            };

            let page_items = resp.items.len();
            let total_count = resp.total_count;
            if resp.incomplete_results {
                log::debug!(target: LOG_TARGET, "[{}] Page {page} reported incomplete results", sq.name);
            }

            fetched += page_items as u64;
            merge_page(hits, sq.name, resp);

            log::info!(
                target: LOG_TARGET,
                "[{}] Page {page}: found {page_items} items, total unique repos: {}",
                sq.name,
                hits.len()
            );

            if page_items < self.settings.page_size as usize || fetched >= total_count {
                break;
            }

            if page >= self.settings.max_pages {
                log::info!(target: LOG_TARGET, "[{}] Reached the provider's result cap after {page} pages", sq.name);
                break;
            }

            page += 1;
            if !pause(token, self.settings.page_delay).await {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Fetch one page, waiting out throttling up to the retry budget. Returns `Ok(None)` if cancelled.
    async fn fetch_page(
        &self,
        sq: &SearchQuery,
        page: u32,
        hits: &SearchHits,
        token: &CancellationToken,
    ) -> Result<Option<CodeSearchResponse>, SearchFailure> {
        let page_str = page.to_string();
        let page_size = self.settings.page_size.to_string();
        let query = [("q", sq.query), ("per_page", page_size.as_str()), ("page", page_str.as_str())];
        let mut retries = 0u32;

        loop {
            log::debug!(target: LOG_TARGET, "[{}] Searching page {page}...", sq.name);

            let Some(result) = or_cancelled(token, self.client.get_json::<CodeSearchResponse>("search/code", &query)).await else {
                return Ok(None);
            };

            match result {
                Ok(resp) => return Ok(Some(resp)),
                Err(error) if error.is_rate_limited() && retries < self.settings.max_rate_limit_retries => {
                    retries += 1;
                    let cooldown = self.client.rate_limit_cooldown();
                    log::warn!(
                        target: LOG_TARGET,
                        "[{}] Rate limited on page {page}, waiting {}s (retry {retries}/{})",
                        sq.name,
                        cooldown.as_secs(),
                        self.settings.max_rate_limit_retries
                    );
                    if !pause(token, cooldown).await {
                        return Ok(None);
                    }
                }
                Err(error) => {
                    return Err(SearchFailure {
                        query: sq.name,
                        page,
                        partial: hits.clone(),
                        error,
                    });
                }
            }
        }
    }
}

/// Insert each hit unless its repository is already known. The first query to match wins.
fn merge_page(hits: &mut SearchHits, category: &str, resp: CodeSearchResponse) {
    for item in resp.items {
        let _ = hits.entry(item.repository.full_name).or_insert_with(|| SearchHit {
            file_url: format!("{}/blob/HEAD/{}", item.repository.html_url.trim_end_matches('/'), item.path),
            file_path: item.path,
            category: category.to_string(),
        });
    }
}
