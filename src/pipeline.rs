//! Pipeline orchestration: normalize, extract, gate, optionally delegate to
//! the probabilistic extractor, merge, then rank against the supplied
//! candidate pool.
//!
//! One execution per incoming query; the configuration snapshot is shared
//! read-only across concurrent executions. The only await point is the
//! optional gap-extractor call, bounded by the configured timeout and
//! abortable through the cancellation channel.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{error::Elapsed, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ConfigSnapshot;
use crate::entity::coverage::{self, CoverageDecision};
use crate::entity::extractor::DeterministicExtractor;
use crate::entity::merge::EntityMerger;
use crate::entity::probabilistic::{
    anchor_gap_entities, supported_types, FailureReason, GapExtractor, GapOutcome,
};
use crate::entity::types::{Entity, ExtractionResult, StageTimings};
use crate::normalize::normalize_query;
use crate::rank::types::{CandidateRecord, RankedCandidate};
use crate::rank::Ranker;
use crate::TARGET_PIPELINE;

/// Outcome of a full pipeline run.
///
/// `NoSignal` is returned only when extraction found nothing AND the
/// candidate pool was empty, so callers can distinguish "we understood
/// nothing" from "valid query, genuinely zero results".
#[derive(Debug)]
pub enum QueryOutcome {
    Results {
        extraction: ExtractionResult,
        ranked: Vec<RankedCandidate>,
    },
    NoSignal {
        extraction: ExtractionResult,
    },
}

pub struct QueryPipeline {
    config: Arc<ConfigSnapshot>,
    extractor: DeterministicExtractor,
    merger: EntityMerger,
    ranker: Ranker,
    gap_extractor: Option<Arc<dyn GapExtractor>>,
    cancel_rx: Option<watch::Receiver<bool>>,
    trace_premerge: bool,
    cache: DashMap<String, Vec<Entity>>,
}

impl QueryPipeline {
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        QueryPipeline {
            extractor: DeterministicExtractor::new(Arc::clone(&config)),
            merger: EntityMerger::new(Arc::clone(&config)),
            ranker: Ranker::new(Arc::clone(&config)),
            config,
            gap_extractor: None,
            cancel_rx: None,
            trace_premerge: false,
            cache: DashMap::new(),
        }
    }

    /// Attach the probabilistic gap extractor. Without one, the pipeline is
    /// fully deterministic and never awaits anything external.
    pub fn with_gap_extractor(mut self, extractor: Arc<dyn GapExtractor>) -> Self {
        self.gap_extractor = Some(extractor);
        self
    }

    /// Attach a cancellation channel. Cancellation aborts only a pending
    /// gap-extractor call; there is no other mid-pipeline state to roll back.
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Keep pre-merge candidates on the extraction result, for debugging.
    pub fn with_premerge_trace(mut self, enabled: bool) -> Self {
        self.trace_premerge = enabled;
        self
    }

    /// Run the extraction stages (normalize through merge) on a query.
    pub async fn understand(&self, query: &str) -> ExtractionResult {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        let stage = Instant::now();
        let normalized = normalize_query(query, &self.config.expansions);
        timings.normalize = stage.elapsed();

        if let Some(cached) = self.cache.get(&normalized) {
            timings.total = total_start.elapsed();
            debug!(
                target: TARGET_PIPELINE,
                "Extraction cache hit for '{}' (config version {})",
                normalized, self.config.version
            );
            return ExtractionResult {
                normalized_text: normalized.clone(),
                entities: cached.value().clone(),
                timings,
                premerge: None,
                from_cache: true,
            };
        }

        let stage = Instant::now();
        let deterministic = self.extractor.extract(&normalized);
        timings.deterministic = stage.elapsed();

        let stage = Instant::now();
        let report =
            coverage::analyze(&normalized, &deterministic, self.config.coverage_threshold);
        timings.coverage = stage.elapsed();

        let mut premerge = deterministic;

        match &report.decision {
            CoverageDecision::Delegate { gap_text } => {
                if let Some(extractor) = &self.gap_extractor {
                    let stage = Instant::now();
                    let outcome = self.call_gap_extractor(extractor, gap_text).await;
                    timings.probabilistic = stage.elapsed();

                    match outcome {
                        GapOutcome::Found(raw) => {
                            let anchored = anchor_gap_entities(&normalized, raw, &self.config);
                            info!(
                                target: TARGET_PIPELINE,
                                "Probabilistic stage contributed {} entities for gap '{}'",
                                anchored.len(),
                                gap_text
                            );
                            premerge.extend(anchored);
                        }
                        GapOutcome::Empty => {
                            debug!(
                                target: TARGET_PIPELINE,
                                "Probabilistic stage found nothing in gap '{}'", gap_text
                            );
                        }
                        GapOutcome::Failed(reason) => {
                            warn!(
                                target: TARGET_PIPELINE,
                                "Probabilistic stage failed, continuing without it: reason={}",
                                reason
                            );
                        }
                    }
                }
            }
            CoverageDecision::Skip(reason) => {
                debug!(
                    target: TARGET_PIPELINE,
                    "Skipping probabilistic stage: {} (coverage {:.2})",
                    reason, report.coverage
                );
            }
        }

        let stage = Instant::now();
        let entities = self.merger.merge(premerge.clone());
        timings.merge = stage.elapsed();
        timings.total = total_start.elapsed();

        self.cache.insert(normalized.clone(), entities.clone());

        info!(
            target: TARGET_PIPELINE,
            "Extraction complete: {} entities, coverage {:.2}, {:?} total",
            entities.len(),
            report.coverage,
            timings.total
        );

        ExtractionResult {
            normalized_text: normalized,
            entities,
            timings,
            premerge: self.trace_premerge.then_some(premerge),
            from_cache: false,
        }
    }

    /// Rank an externally supplied candidate pool against an entity set.
    pub fn rank(
        &self,
        entities: &[Entity],
        normalized_query: &str,
        pool: Vec<CandidateRecord>,
        limit: usize,
    ) -> Vec<RankedCandidate> {
        self.ranker.rank(entities, normalized_query, pool, limit)
    }

    /// Full pipeline: extraction plus ranking.
    pub async fn run(
        &self,
        query: &str,
        pool: Vec<CandidateRecord>,
        limit: usize,
    ) -> QueryOutcome {
        let extraction = self.understand(query).await;

        if extraction.entities.is_empty() && pool.is_empty() {
            info!(
                target: TARGET_PIPELINE,
                "No signal for query '{}': no entities and empty candidate pool", query
            );
            return QueryOutcome::NoSignal { extraction };
        }

        let ranked = self.rank(
            &extraction.entities,
            &extraction.normalized_text,
            pool,
            limit,
        );
        QueryOutcome::Results { extraction, ranked }
    }

    async fn call_gap_extractor(
        &self,
        extractor: &Arc<dyn GapExtractor>,
        gap_text: &str,
    ) -> GapOutcome {
        let types = supported_types();
        let call = timeout(self.config.llm.timeout, extractor.extract(gap_text, &types));

        match &self.cancel_rx {
            Some(cancel_rx) => {
                let mut cancel_rx = cancel_rx.clone();
                tokio::select! {
                    _ = cancelled(&mut cancel_rx) => {
                        GapOutcome::Failed(FailureReason::Cancelled)
                    }
                    result = call => flatten_timeout(result),
                }
            }
            None => flatten_timeout(call.await),
        }
    }
}

fn flatten_timeout(result: Result<GapOutcome, Elapsed>) -> GapOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(_) => GapOutcome::Failed(FailureReason::Timeout),
    }
}

/// Resolves when the cancellation channel flips to true. A dropped sender
/// never cancels.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::probabilistic::{GapEntity, TypeDescription};
    use crate::entity::types::EntityType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingExtractor {
        calls: AtomicUsize,
        outcome: GapOutcome,
    }

    impl CountingExtractor {
        fn new(outcome: GapOutcome) -> Self {
            CountingExtractor {
                calls: AtomicUsize::new(0),
                outcome,
            }
        }
    }

    #[async_trait]
    impl GapExtractor for CountingExtractor {
        async fn extract(&self, _gap_text: &str, _types: &[TypeDescription]) -> GapOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct SleepyExtractor;

    #[async_trait]
    impl GapExtractor for SleepyExtractor {
        async fn extract(&self, _gap_text: &str, _types: &[TypeDescription]) -> GapOutcome {
            tokio::time::sleep(Duration::from_secs(600)).await;
            GapOutcome::Empty
        }
    }

    fn pipeline() -> QueryPipeline {
        QueryPipeline::new(Arc::new(ConfigSnapshot::default()))
    }

    fn candidate(id: &str, table: &str, title: &str) -> CandidateRecord {
        CandidateRecord {
            id: id.to_string(),
            table: table.to_string(),
            title: title.to_string(),
            search_text: String::new(),
            identifiers: Vec::new(),
            parent_doc: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_fully_covered_query_skips_probabilistic() {
        let extractor = Arc::new(CountingExtractor::new(GapOutcome::Empty));
        let pipeline = pipeline().with_gap_extractor(extractor.clone());

        let result = pipeline.understand("fuel filter").await;
        assert!(!result.entities.is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uncovered_query_delegates_once() {
        let extractor = Arc::new(CountingExtractor::new(GapOutcome::Empty));
        let pipeline = pipeline().with_gap_extractor(extractor.clone());

        pipeline
            .understand("fuel filter compatible with the old housing variant")
            .await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probabilistic_entities_are_merged() {
        let extractor = Arc::new(CountingExtractor::new(GapOutcome::Found(vec![GapEntity {
            text: "housing".to_string(),
            entity_type: "EQUIPMENT".to_string(),
            confidence: 0.9,
        }])));
        let pipeline = pipeline().with_gap_extractor(extractor);

        let result = pipeline
            .understand("fuel filter compatible with the old housing variant")
            .await;

        let housing = result.entities.iter().find(|e| e.text == "housing");
        assert!(housing.is_some());
        let housing = housing.unwrap();
        assert_eq!(housing.entity_type, EntityType::Equipment);
        assert!(housing.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_probabilistic_failure_keeps_deterministic_entities() {
        let extractor = Arc::new(CountingExtractor::new(GapOutcome::Failed(
            FailureReason::MalformedResponse,
        )));
        let pipeline = pipeline().with_gap_extractor(extractor);

        let result = pipeline
            .understand("fuel filter compatible with the old housing variant")
            .await;
        assert!(result.entities.iter().any(|e| e.text == "fuel filter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_deterministic_entities() {
        let pipeline = pipeline().with_gap_extractor(Arc::new(SleepyExtractor));

        let result = pipeline
            .understand("fuel filter compatible with the old housing variant")
            .await;

        // The sleepy extractor never answers; the deterministic entities
        // still come back once the configured timeout elapses.
        assert!(result.entities.iter().any(|e| e.text == "fuel filter"));
        assert!(result.timings.probabilistic >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_call() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pipeline = pipeline()
            .with_gap_extractor(Arc::new(SleepyExtractor))
            .with_cancellation(cancel_rx);

        cancel_tx.send(true).unwrap();

        let result = pipeline
            .understand("fuel filter compatible with the old housing variant")
            .await;
        assert!(result.entities.iter().any(|e| e.text == "fuel filter"));
    }

    #[tokio::test]
    async fn test_idempotent_output() {
        let query = "urgent fuel filter MTU-4000-1234 manual";

        let a = pipeline().understand(query).await;
        let b = pipeline().understand(query).await;

        assert_eq!(format!("{:?}", a.entities), format!("{:?}", b.entities));
        assert_eq!(a.normalized_text, b.normalized_text);
    }

    #[tokio::test]
    async fn test_extraction_cache() {
        let pipeline = pipeline();

        let first = pipeline.understand("fuel filter MTU").await;
        assert!(!first.from_cache);

        let second = pipeline.understand("fuel   filter MTU").await;
        assert!(second.from_cache);
        assert_eq!(
            format!("{:?}", first.entities),
            format!("{:?}", second.entities)
        );
    }

    #[tokio::test]
    async fn test_no_signal_outcome() {
        let outcome = pipeline().run("ok then", Vec::new(), 10).await;
        assert!(matches!(outcome, QueryOutcome::NoSignal { .. }));
    }

    #[tokio::test]
    async fn test_empty_pool_with_entities_is_not_no_signal() {
        let outcome = pipeline().run("fuel filter", Vec::new(), 10).await;
        match outcome {
            QueryOutcome::Results { ranked, .. } => assert!(ranked.is_empty()),
            other => panic!("expected Results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_run_ranks_candidates() {
        let pool = vec![
            candidate("m-1", "manuals", "MTU fuel filter service manual"),
            candidate("i-1", "inventory", "Generic oil filter"),
        ];

        let outcome = pipeline().run("fuel filter MTU manual", pool, 10).await;
        match outcome {
            QueryOutcome::Results { ranked, extraction } => {
                assert!(!extraction.entities.is_empty());
                assert_eq!(ranked[0].candidate.id, "m-1");
            }
            other => panic!("expected Results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_premerge_trace() {
        let result = pipeline()
            .with_premerge_trace(true)
            .understand("fuel filter MTU")
            .await;
        let premerge = result.premerge.expect("trace enabled");
        assert!(premerge.len() >= result.entities.len());
    }
}
