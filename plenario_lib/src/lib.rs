//! Pipeline layer for plenario: multi-source collection and reconciliation
//! of Brazilian federal legislative data.
//!
//! Wraps the `plenario_api` clients with rate limiting, retries, and a TTL
//! response cache, and adds the reconciliation machinery: tabular
//! ingestion, entity resolution, deduplication, and source-fallback
//! orchestration over a SQLite store.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod orchestrate;
pub mod paginate;
pub mod resolve;
pub mod shutdown;
pub mod sources;
pub mod store;
pub mod summarize;
pub mod tabular;

pub use plenario_api;

pub use cache::{object_path, CacheStats, DiskCache, LocalObjectStore, ObjectStore};
pub use config::{
    AmendmentConfig, CacheConfig, ExpenseConfig, FetchConfig, PipelineConfig, PropositionConfig,
    ResolverConfig, VoteConfig,
};
pub use dedup::{canonical_key, CanonicalKey, Deduplicator, RecordType};
pub use error::PipelineError;
pub use fetch::{RateLimitedFetcher, RequestTracker, TrackerSummary, Upstream};
pub use orchestrate::{
    resolver_from_store, CollectionResult, Orchestrator, SourceState, TargetSpec,
};
pub use paginate::{paginate, PageCollection, PaginateOptions};
pub use resolve::{EntityResolver, MatchConfidence, NameIndex, ResolvedEntity};
pub use shutdown::CancelFlag;
pub use sources::{CollectOutcome, Provenance, RecordSource, SourceRecord};
pub use store::{LegislatorRow, SqliteStore, Store, StoreError, UpsertOutcome};
pub use summarize::{parse_score_response, StaticSummarizer, Summarizer};
pub use tabular::{parse_money, TabularIngestor, Table};
