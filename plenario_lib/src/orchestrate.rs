//! Source-fallback orchestration and the record reconciliation loop.
//!
//! For each collection target the orchestrator walks an explicit state
//! machine over the configured sources in priority order:
//!
//! ```text
//! NotStarted -> TryingSource(i) -> Success(i)
//!                              \-> TryingSource(i+1) -> ... -> AllFailed
//! ```
//!
//! The first source that yields records wins; lower-priority sources are
//! never consulted after a success, even if the winner returned fewer
//! records than expected — partial data from one source beats conflicting
//! attributions merged from several.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ResolverConfig;
use crate::dedup::{canonical_key, RecordType};
use crate::error::PipelineError;
use crate::resolve::{EntityResolver, NameIndex};
use crate::shutdown::CancelFlag;
use crate::sources::{RecordSource, SourceRecord};
use crate::store::{Store, UpsertOutcome};

/// Aggregate counters for one orchestration run. Created at run start,
/// mutated per record, finalized (timestamped) at run end, and handed
/// read-only to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub target: String,
    pub year: i32,
    pub found: u64,
    pub saved: u64,
    pub with_match: u64,
    pub without_match: u64,
    pub errors: u64,
    pub total_value: f64,
    /// Name of the source that ultimately served the run, if any.
    pub source_used: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollectionResult {
    pub fn start(target: &str, year: i32) -> Self {
        Self {
            target: target.to_string(),
            year,
            found: 0,
            saved: 0,
            with_match: 0,
            without_match: 0,
            errors: 0,
            total_value: 0.0,
            source_used: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finalize(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Folds a partition's counters into this run-level result.
    pub fn merge(&mut self, other: &CollectionResult) {
        self.found += other.found;
        self.saved += other.saved;
        self.with_match += other.with_match;
        self.without_match += other.without_match;
        self.errors += other.errors;
        self.total_value += other.total_value;
        if self.source_used.is_none() {
            self.source_used = other.source_used.clone();
        }
    }
}

/// Orchestrator states, one per fallback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    NotStarted,
    TryingSource(usize),
    Success(usize),
    AllFailed,
}

/// Static description of one collection target.
#[derive(Debug, Clone, Copy)]
pub struct TargetSpec {
    pub name: &'static str,
    pub record_type: RecordType,
    /// Attribute records to legislators via the resolver (amendments).
    pub resolve_authors: bool,
    /// Payload field accumulated into `total_value`.
    pub value_field: Option<&'static str>,
}

impl TargetSpec {
    pub const LEGISLATORS: TargetSpec = TargetSpec {
        name: "legislators",
        record_type: RecordType::Legislator,
        resolve_authors: false,
        value_field: None,
    };

    pub const EXPENSES: TargetSpec = TargetSpec {
        name: "expenses",
        record_type: RecordType::Expense,
        resolve_authors: false,
        value_field: Some("net_value"),
    };

    pub const AMENDMENTS: TargetSpec = TargetSpec {
        name: "amendments",
        record_type: RecordType::Amendment,
        resolve_authors: true,
        value_field: Some("value"),
    };

    pub const VOTES: TargetSpec = TargetSpec {
        name: "votes",
        record_type: RecordType::Vote,
        resolve_authors: false,
        value_field: None,
    };

    pub const PROPOSITIONS: TargetSpec = TargetSpec {
        name: "propositions",
        record_type: RecordType::Proposition,
        resolve_authors: false,
        value_field: None,
    };
}

/// Builds the resolver over the legislators currently persisted.
pub fn resolver_from_store(
    store: &dyn Store,
    cfg: &ResolverConfig,
) -> Result<EntityResolver, PipelineError> {
    let rows = store
        .legislators()?
        .into_iter()
        .map(|row| (row.id, row.name, row.author_code))
        .collect();
    let index = NameIndex::build(rows);
    tracing::debug!("name index built with {} entities", index.len());
    Ok(EntityResolver::new(Arc::new(index), cfg))
}

/// Drives sources and reconciles their records into the store.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    resolver: Option<Arc<EntityResolver>>,
    cancel: CancelFlag,
    workers: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: Option<Arc<EntityResolver>>,
        cancel: CancelFlag,
        workers: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            cancel,
            workers,
        }
    }

    /// Runs one target through its source chain.
    ///
    /// Returns `Err(SourceUnavailable)` only when every source failed with
    /// an error; if sources were reachable but all empty, the result is an
    /// empty success.
    pub async fn run_target(
        &self,
        target: &TargetSpec,
        year: i32,
        sources: &[Box<dyn RecordSource>],
    ) -> Result<CollectionResult, PipelineError> {
        let mut result = CollectionResult::start(target.name, year);
        let mut state = SourceState::NotStarted;
        let mut any_error = false;

        tracing::debug!("{}: {:?} -> TryingSource(0)", target.name, state);
        state = SourceState::TryingSource(0);
        while let SourceState::TryingSource(i) = state {
            let Some(source) = sources.get(i) else {
                state = SourceState::AllFailed;
                break;
            };

            tracing::info!("{}: trying source {} ({})", target.name, i, source.name());

            if !source.probe().await {
                tracing::warn!("{}: source {} failed its probe", target.name, source.name());
                any_error = true;
                state = SourceState::TryingSource(i + 1);
                continue;
            }

            match source.collect(year, &self.cancel).await {
                Err(e) => {
                    tracing::warn!("{}: source {} failed: {}", target.name, source.name(), e);
                    result.errors += 1;
                    any_error = true;
                    state = SourceState::TryingSource(i + 1);
                }
                Ok(outcome) if outcome.records.is_empty() => {
                    tracing::warn!(
                        "{}: source {} returned no usable records",
                        target.name,
                        source.name()
                    );
                    result.errors += outcome.errors;
                    state = SourceState::TryingSource(i + 1);
                }
                Ok(outcome) => {
                    result.errors += outcome.errors;
                    result.source_used = Some(source.name().to_string());
                    self.process_records(target, outcome.records, &mut result);
                    state = SourceState::Success(i);
                }
            }
        }

        match state {
            SourceState::Success(_) => Ok(result.finalize()),
            SourceState::AllFailed if any_error => {
                Err(PipelineError::SourceUnavailable(target.name.to_string()))
            }
            // Reachable sources, nothing to collect: an empty run.
            SourceState::AllFailed => Ok(result.finalize()),
            SourceState::NotStarted | SourceState::TryingSource(_) => {
                Err(PipelineError::SourceUnavailable(target.name.to_string()))
            }
        }
    }

    /// Runs a partitioned target (e.g. expenses, one partition per
    /// legislator) through the bounded worker pool and merges the
    /// per-partition results.
    pub async fn run_partitioned(
        &self,
        target: &TargetSpec,
        year: i32,
        partitions: Vec<i64>,
        make_sources: Arc<dyn Fn(i64) -> Vec<Box<dyn RecordSource>> + Send + Sync>,
    ) -> Result<CollectionResult, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        let mut join_set = JoinSet::new();
        let total = partitions.len();

        for partition in partitions {
            if self.cancel.is_cancelled() {
                break;
            }
            let semaphore = semaphore.clone();
            let orchestrator = self.clone();
            let make_sources = make_sources.clone();
            let target = *target;
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let sources = make_sources(partition);
                orchestrator.run_target(&target, year, &sources).await
            });
        }

        let mut merged = CollectionResult::start(target.name, year);
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(part)) => {
                    merged.merge(&part);
                    succeeded += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!("{}: partition failed: {}", target.name, e);
                    merged.errors += 1;
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!("{}: worker panicked: {}", target.name, e);
                    merged.errors += 1;
                    failed += 1;
                }
            }
        }

        tracing::info!(
            "{}: {}/{} partitions succeeded, {} failed",
            target.name,
            succeeded,
            total,
            failed
        );
        if succeeded == 0 && failed > 0 {
            return Err(PipelineError::SourceUnavailable(target.name.to_string()));
        }
        Ok(merged.finalize())
    }

    /// The reconciliation loop: dedup pre-check, author resolution, then
    /// the idempotent insert. One bad record never aborts the batch.
    fn process_records(
        &self,
        target: &TargetSpec,
        records: Vec<SourceRecord>,
        result: &mut CollectionResult,
    ) {
        for record in records {
            if self.cancel.is_cancelled() {
                tracing::warn!("{}: cancelled mid-batch", target.name);
                break;
            }
            result.found += 1;

            let key = match canonical_key(target.record_type, &record.payload) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("{}: {}", target.name, e);
                    result.errors += 1;
                    continue;
                }
            };

            // Optimization only; the store's unique key is authoritative.
            match self.store.record_exists(target.record_type, &key) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("{}: exists check failed: {}", target.name, e);
                    result.errors += 1;
                    continue;
                }
            }

            let mut payload = record.payload;
            let mut matched = false;
            if target.resolve_authors {
                if let Some(resolver) = &self.resolver {
                    let name = payload
                        .get("author_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    let code = payload.get("author_code").and_then(|v| v.as_i64());
                    if let Some(entity) = resolver.resolve(name, code) {
                        payload["legislator_id"] = serde_json::json!(entity.entity_id);
                        payload["match_confidence"] = serde_json::json!(entity.confidence.to_string());
                        payload["match_score"] = serde_json::json!(entity.score);
                        matched = true;
                    }
                }
            }

            let value = target
                .value_field
                .and_then(|field| payload.get(field))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);

            match self.store.upsert_or_skip(target.record_type, &key, &payload) {
                Ok(UpsertOutcome::Inserted) => {
                    result.saved += 1;
                    result.total_value += value;
                    if target.resolve_authors {
                        if matched {
                            result.with_match += 1;
                        } else {
                            result.without_match += 1;
                        }
                    }
                }
                // Lost the race to another worker: already reconciled.
                Ok(UpsertOutcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!("{}: insert failed: {}", target.name, e);
                    result.errors += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;

    use crate::sources::{BoxFuture, CollectOutcome, Provenance};
    use crate::store::SqliteStore;

    enum StubBehavior {
        Fail,
        Empty,
        Records(Vec<serde_json::Value>),
    }

    struct StubSource {
        name: &'static str,
        behavior: StubBehavior,
        probe_ok: bool,
        called: Arc<AtomicBool>,
    }

    impl StubSource {
        fn new(name: &'static str, behavior: StubBehavior) -> Self {
            Self {
                name,
                behavior,
                probe_ok: true,
                called: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing_probe(name: &'static str) -> Self {
            Self {
                name,
                behavior: StubBehavior::Empty,
                probe_ok: false,
                called: Arc::new(AtomicBool::new(false)),
            }
        }

        fn call_flag(&self) -> Arc<AtomicBool> {
            self.called.clone()
        }
    }

    impl RecordSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        fn probe<'a>(&'a self) -> BoxFuture<'a, bool> {
            Box::pin(async move { self.probe_ok })
        }

        fn collect<'a>(
            &'a self,
            _year: i32,
            _cancel: &'a CancelFlag,
        ) -> BoxFuture<'a, Result<CollectOutcome, PipelineError>> {
            self.called.store(true, Ordering::SeqCst);
            Box::pin(async move {
                match &self.behavior {
                    StubBehavior::Fail => Err(PipelineError::SourceUnavailable(
                        self.name.to_string(),
                    )),
                    StubBehavior::Empty => Ok(CollectOutcome::default()),
                    StubBehavior::Records(payloads) => Ok(CollectOutcome {
                        records: payloads
                            .iter()
                            .map(|p| SourceRecord {
                                payload: p.clone(),
                                provenance: Provenance::now(self.name, "stub://"),
                            })
                            .collect(),
                        errors: 0,
                    }),
                }
            })
        }
    }

    fn test_store() -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store.init().unwrap();
        Arc::new(store)
    }

    fn orchestrator(store: Arc<SqliteStore>) -> Orchestrator {
        Orchestrator::new(store, None, CancelFlag::new(), 2)
    }

    fn amendment(id: &str, value: f64) -> serde_json::Value {
        json!({
            "external_id": id,
            "author_name": "FULANO",
            "author_code": null,
            "value": value,
        })
    }

    #[tokio::test]
    async fn first_successful_source_wins() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let a = StubSource::new("a", StubBehavior::Records(vec![amendment("X1", 10.0)]));
        let b = StubSource::new("b", StubBehavior::Records(vec![amendment("X2", 20.0)]));
        let c = StubSource::new("c", StubBehavior::Records(vec![amendment("X3", 30.0)]));
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b), Box::new(c)];

        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        assert_eq!(result.source_used.as_deref(), Some("a"));
        assert_eq!(result.saved, 1);
        assert_eq!(result.total_value, 10.0);
    }

    #[tokio::test]
    async fn fallback_monotonicity_lower_sources_untouched() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let a = StubSource::new("a", StubBehavior::Records(vec![amendment("Y1", 5.0)]));
        let b = StubSource::new("b", StubBehavior::Records(vec![amendment("Y2", 6.0)]));
        let c = StubSource::new("c", StubBehavior::Records(vec![amendment("Y3", 7.0)]));
        let (b_called, c_called) = (b.call_flag(), c.call_flag());
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b), Box::new(c)];

        orch.run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        assert!(!b_called.load(Ordering::SeqCst));
        assert!(!c_called.load(Ordering::SeqCst));
        // The store only holds records from source a.
        assert_eq!(store.count(RecordType::Amendment).unwrap(), 1);
        let found = store
            .find_entity_by_natural_key(RecordType::Amendment, "Y2")
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn failed_and_empty_sources_fall_through() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let a = StubSource::new("a", StubBehavior::Fail);
        let b = StubSource::new("b", StubBehavior::Empty);
        let c = StubSource::new("c", StubBehavior::Records(vec![amendment("Z1", 7.0)]));
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b), Box::new(c)];

        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        assert_eq!(result.source_used.as_deref(), Some("c"));
        assert_eq!(result.saved, 1);
        assert_eq!(result.errors, 1);
    }

    #[tokio::test]
    async fn probe_failure_skips_source() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let a = StubSource::failing_probe("a");
        let b = StubSource::new("b", StubBehavior::Records(vec![amendment("P1", 1.0)]));
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b)];

        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();
        assert_eq!(result.source_used.as_deref(), Some("b"));
        // The probed-out source was never collected from.
        assert_eq!(store.count(RecordType::Amendment).unwrap(), 1);
    }

    #[tokio::test]
    async fn all_sources_erroring_is_hard_failure() {
        let store = test_store();
        let orch = orchestrator(store);

        let a = StubSource::new("a", StubBehavior::Fail);
        let b = StubSource::new("b", StubBehavior::Fail);
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b)];

        let result = orch.run_target(&TargetSpec::AMENDMENTS, 2025, &sources).await;
        assert!(matches!(
            result,
            Err(PipelineError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn all_sources_empty_is_empty_success() {
        let store = test_store();
        let orch = orchestrator(store);

        let a = StubSource::new("a", StubBehavior::Empty);
        let b = StubSource::new("b", StubBehavior::Empty);
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(a), Box::new(b)];

        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();
        assert_eq!(result.found, 0);
        assert_eq!(result.saved, 0);
        assert!(result.source_used.is_none());
        assert!(result.finished_at.is_some());
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let records = vec![amendment("I1", 10.0), amendment("I2", 20.0)];
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(StubSource::new(
            "a",
            StubBehavior::Records(records.clone()),
        ))];
        let first = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();
        assert_eq!(first.saved, 2);

        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(StubSource::new(
            "a",
            StubBehavior::Records(records),
        ))];
        let second = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();
        assert_eq!(second.found, 2);
        assert_eq!(second.saved, 0);
        assert_eq!(second.total_value, 0.0);
        assert_eq!(store.count(RecordType::Amendment).unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_records_counted_not_fatal() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let records = vec![
            json!({"no_key_field": true}),
            amendment("OK1", 3.0),
        ];
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(StubSource::new(
            "a",
            StubBehavior::Records(records),
        ))];
        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        assert_eq!(result.found, 2);
        assert_eq!(result.saved, 1);
        assert_eq!(result.errors, 1);
    }

    #[tokio::test]
    async fn resolver_attribution_counts_matches() {
        let store = test_store();
        // Seed one legislator for the index.
        let legislator = json!({
            "external_id": "100", "name": "Fernanda Melchionna",
            "party": "PSOL", "state": "RS", "author_code": 190
        });
        let key = canonical_key(RecordType::Legislator, &legislator).unwrap();
        store
            .upsert_or_skip(RecordType::Legislator, &key, &legislator)
            .unwrap();

        let resolver =
            resolver_from_store(store.as_ref(), &crate::config::ResolverConfig::default())
                .unwrap();
        let orch = Orchestrator::new(store.clone(), Some(Arc::new(resolver)), CancelFlag::new(), 2);

        let records = vec![
            json!({"external_id": "A1", "author_name": "FERNANDA MELCHIONNA", "author_code": null, "value": 100.0}),
            json!({"external_id": "A2", "author_name": "BANCADA RS", "author_code": null, "value": 50.0}),
        ];
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(StubSource::new(
            "csv",
            StubBehavior::Records(records),
        ))];
        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        assert_eq!(result.saved, 2);
        assert_eq!(result.with_match, 1);
        assert_eq!(result.without_match, 1);
        assert_eq!(result.total_value, 150.0);
    }

    #[tokio::test]
    async fn partitioned_run_merges_results() {
        let store = test_store();
        let orch = orchestrator(store.clone());

        let make_sources: Arc<dyn Fn(i64) -> Vec<Box<dyn RecordSource>> + Send + Sync> =
            Arc::new(|partition| {
                let records = vec![json!({
                    "legislator_id": partition,
                    "year": 2025,
                    "month": 7,
                    "document_number": format!("doc-{}", partition),
                    "net_value": 100.0,
                })];
                vec![Box::new(StubSource::new(
                    "api",
                    StubBehavior::Records(records),
                )) as Box<dyn RecordSource>]
            });

        let result = orch
            .run_partitioned(&TargetSpec::EXPENSES, 2025, vec![1, 2, 3], make_sources)
            .await
            .unwrap();

        assert_eq!(result.found, 3);
        assert_eq!(result.saved, 3);
        assert_eq!(result.total_value, 300.0);
        assert_eq!(store.count(RecordType::Expense).unwrap(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_processing() {
        let store = test_store();
        let cancel = CancelFlag::new();
        let orch = Orchestrator::new(store.clone(), None, cancel.clone(), 2);
        cancel.cancel();

        let records = vec![amendment("C1", 1.0), amendment("C2", 2.0)];
        let sources: Vec<Box<dyn RecordSource>> = vec![Box::new(StubSource::new(
            "a",
            StubBehavior::Records(records),
        ))];
        let result = orch
            .run_target(&TargetSpec::AMENDMENTS, 2025, &sources)
            .await
            .unwrap();

        // The batch loop observed the flag before processing any record.
        assert_eq!(result.saved, 0);
    }
}
