//! Collection sources.
//!
//! Each target (amendments, expenses, votes, propositions, legislators) is
//! served by one or more [`RecordSource`] implementations. Sources fetch
//! raw upstream records, apply their own filtering, and emit canonical
//! payloads plus provenance; attribution and persistence happen in the
//! orchestrator. The orchestrator tries sources strictly in priority order
//! and stops at the first that yields usable records.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::PipelineError;
use crate::shutdown::CancelFlag;

pub mod amendments;
pub mod expenses;
pub mod legislators;
pub mod propositions;
pub mod votes;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where and when a record was obtained.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_name: String,
    pub retrieved_at: DateTime<Utc>,
    pub source_url: String,
}

impl Provenance {
    pub fn now(source_name: &str, source_url: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            retrieved_at: Utc::now(),
            source_url: source_url.to_string(),
        }
    }
}

/// One raw record: a canonical payload plus where it came from. Transient;
/// discarded once reconciled.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub payload: Value,
    pub provenance: Provenance,
}

/// What one source produced for a target: the usable records plus the
/// number of record-level problems it recovered from along the way.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub records: Vec<SourceRecord>,
    pub errors: u64,
}

/// A prioritized data source for one collection target.
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap availability probe. Sources that cannot check anything up
    /// front report available and fail in `collect` instead.
    fn probe<'a>(&'a self) -> BoxFuture<'a, bool> {
        Box::pin(async { true })
    }

    /// Collects records for `year`. An `Err` or an empty result means the
    /// orchestrator falls through to the next source.
    fn collect<'a>(
        &'a self,
        year: i32,
        cancel: &'a CancelFlag,
    ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>>;
}
