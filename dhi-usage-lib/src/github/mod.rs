//! Ingestion from the GitHub API
//!
//! Three layers, leaf to root:
//!
//! - [`Client`] issues authenticated requests and classifies throttling responses as
//!   [`ApiError::RateLimited`] so callers can apply the long cooldown.
//! - [`SearchAggregator`] runs the fixed, ordered query set against the code-search endpoint,
//!   paginating each query up to the provider's result cap and merging hits into a map keyed
//!   by repository full name. The first query to match a repository owns its category.
//! - [`Enricher`] fetches repository metadata and resolves the adoption commit for each hit.
//!
//! Every wait point (page delay, cooldown, request in flight) observes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) so a refresh run can unwind promptly.

mod client;
mod enrich;
mod pacing;
mod payloads;
mod search;

pub use client::{ApiError, ApiResponse, Client, DEFAULT_API_BASE_URL, DEFAULT_API_VERSION, RateLimitInfo};
pub use enrich::{Adoption, EnrichError, EnrichedRepo, Enricher};
pub use pacing::{or_cancelled, pause};
pub use payloads::RepoDetails;
pub use search::{DEFAULT_QUERIES, SearchAggregator, SearchFailure, SearchHit, SearchHits, SearchOutcome, SearchQuery, SearchSettings};
