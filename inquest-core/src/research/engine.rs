//! Research engine: the recursive plan → search → synthesize loop and the report step.

use super::call::{Delivery, Emitter, Markers, ModelCaller};
use super::planner;
use super::prompts::follow_up_topic;
use super::report::write_report;
use super::state::{ResearchOutcome, ResearchState};
use super::synthesizer::{self, Synthesis};
use crate::brain::LlmProvider;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::mux::EventSink;
use crate::search::{SearchAdapter, SearchOutcome};
use crate::types::{PlannedQuery, ResearchRequest, Stage};
use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of calls of each kind made by an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub plan_calls: usize,
    pub search_calls: usize,
    pub synthesize_calls: usize,
    pub report_calls: usize,
}

#[derive(Debug, Default)]
struct CallCounters {
    plan: AtomicUsize,
    search: AtomicUsize,
    synthesize: AtomicUsize,
    report: AtomicUsize,
}

impl CallCounters {
    fn snapshot(&self) -> CallStats {
        CallStats {
            plan_calls: self.plan.load(Ordering::SeqCst),
            search_calls: self.search.load(Ordering::SeqCst),
            synthesize_calls: self.synthesize.load(Ordering::SeqCst),
            report_calls: self.report.load(Ordering::SeqCst),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: ResearchOutcome,
    pub report: String,
    pub stats: CallStats,
}

/// One level of the recursion.
#[derive(Debug, Clone)]
struct Frame {
    topic: String,
    breadth: usize,
    depth: usize,
    level: usize,
}

/// Drives one research run. Call counters accumulate over the engine's lifetime,
/// so build one engine per run when per-run statistics matter.
pub struct ResearchEngine {
    caller: ModelCaller,
    search: SearchAdapter,
    config: ResearchConfig,
    results_per_query: usize,
    counters: CallCounters,
}

impl ResearchEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: SearchAdapter,
        config: ResearchConfig,
    ) -> Self {
        let markers = Markers {
            open: config.open_marker.clone(),
            close: config.close_marker.clone(),
        };
        Self {
            caller: ModelCaller::new(provider, markers),
            search,
            config,
            results_per_query: 5,
            counters: CallCounters::default(),
        }
    }

    /// Hits requested from the search backend per query.
    pub fn with_results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = n.max(1);
        self
    }

    pub fn stats(&self) -> CallStats {
        self.counters.snapshot()
    }

    /// Run the recursive research phase and return the accumulated knowledge.
    pub async fn research(
        &self,
        request: &ResearchRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<ResearchOutcome, ResearchError> {
        info!(
            topic = %request.topic,
            breadth = request.breadth,
            depth = request.depth,
            concurrency = self.config.effective_concurrency(),
            "Starting research"
        );
        let mut emitter = Emitter::new(sink.clone(), Delivery::Live);
        let frame = Frame {
            topic: request.topic.clone(),
            breadth: request.breadth,
            depth: request.depth,
            level: 0,
        };
        let state = self
            .research_level(frame, ResearchState::new(), &mut emitter, cancel)
            .await?;
        emitter.flush().await?;

        let outcome = state.into_outcome();
        info!(
            learnings = outcome.learnings.len(),
            urls = outcome.visited_urls.len(),
            "Research phase complete"
        );
        Ok(outcome)
    }

    /// Research, then stream the final report.
    pub async fn run(
        &self,
        request: &ResearchRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ResearchError> {
        let outcome = self.research(request, sink, cancel).await?;

        let mut emitter = Emitter::new(sink.clone(), Delivery::Live);
        self.counters.report.fetch_add(1, Ordering::SeqCst);
        let report = write_report(
            &self.caller,
            &request.topic,
            &outcome.learnings,
            &outcome.visited_urls,
            &mut emitter,
            cancel,
        )
        .await?;

        let stats = self.stats();
        info!(
            plan_calls = stats.plan_calls,
            search_calls = stats.search_calls,
            synthesize_calls = stats.synthesize_calls,
            report_chars = report.chars().count(),
            "Run complete"
        );
        Ok(RunSummary {
            outcome,
            report,
            stats,
        })
    }

    fn research_level<'a>(
        &'a self,
        frame: Frame,
        state: ResearchState,
        emitter: &'a mut Emitter,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ResearchState, ResearchError>> {
        async move {
            if frame.level >= frame.depth {
                return Ok(state);
            }
            if cancel.is_cancelled() {
                return Err(ResearchError::Cancelled);
            }

            emitter
                .status(
                    Stage::Plan,
                    format!(
                        "Planning up to {} queries (level {} of {})…",
                        frame.breadth,
                        frame.level + 1,
                        frame.depth
                    ),
                )
                .await?;
            self.counters.plan.fetch_add(1, Ordering::SeqCst);
            let planned = planner::plan(
                &self.caller,
                &frame.topic,
                state.learnings(),
                frame.breadth,
                emitter,
                cancel,
            )
            .await;
            let queries = match planned {
                Ok(queries) => queries,
                Err(ResearchError::Llm(e)) => {
                    warn!(level = frame.level, error = %e, "Planner call failed");
                    emitter
                        .status(
                            Stage::Plan,
                            format!("Planning failed ({}); keeping what was found so far", e),
                        )
                        .await?;
                    emitter.flush().await?;
                    return Ok(state);
                }
                Err(e) => return Err(e),
            };
            debug!(level = frame.level, queries = queries.len(), "Level planned");

            let concurrency = self.config.effective_concurrency();
            let delivery = if concurrency > 1 {
                Delivery::Batched
            } else {
                Delivery::Live
            };
            let base = state.snapshot();
            let frame_ref = &frame;
            let base_ref = &base;
            let parent: &Emitter = emitter;

            let results: Vec<Result<ResearchState, ResearchError>> =
                futures::stream::iter(queries.into_iter().map(|query| {
                    let mut branch_emitter = parent.fork(delivery);
                    async move {
                        let result = self
                            .run_branch(query, frame_ref, base_ref.snapshot(), &mut branch_emitter, cancel)
                            .await;
                        let flushed = branch_emitter.flush().await;
                        flushed.and(result)
                    }
                }))
                .buffered(concurrency)
                .collect()
                .await;

            // Single-writer merge, only once every branch has finished.
            let mut merged = state;
            for result in results {
                merged.merge(&result?);
            }
            Ok(merged)
        }
        .boxed()
    }

    /// Search, synthesize, and optionally recurse for one planned query.
    ///
    /// A failed search or synthesis drops this query's contribution and
    /// returns `base` unchanged. Only cancellation is an error.
    async fn run_branch(
        &self,
        query: PlannedQuery,
        frame: &Frame,
        base: ResearchState,
        emitter: &mut Emitter,
        cancel: &CancellationToken,
    ) -> Result<ResearchState, ResearchError> {
        emitter
            .status(Stage::Search, format!("Searching: {}", query.query))
            .await?;
        self.counters.search.fetch_add(1, Ordering::SeqCst);
        let SearchOutcome { hits, note } = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            outcome = self.search.search(&query.query, self.results_per_query) => outcome,
        };
        if let Some(note) = note {
            emitter.status(Stage::Search, note).await?;
        }
        emitter
            .status(Stage::Search, format!("Found {} results", hits.len()))
            .await?;
        if hits.is_empty() {
            emitter.flush().await?;
            return Ok(base);
        }

        emitter
            .status(
                Stage::Synthesize,
                format!("Extracting learnings from {} results…", hits.len()),
            )
            .await?;
        self.counters.synthesize.fetch_add(1, Ordering::SeqCst);
        let synthesis = match synthesizer::synthesize(
            &self.caller,
            &query.query,
            &hits,
            self.config.learnings_per_query,
            emitter,
            cancel,
        )
        .await
        {
            Ok(synthesis) => synthesis,
            Err(ResearchError::Llm(e)) => {
                warn!(query = %query.query, error = %e, "Synthesizer call failed");
                emitter
                    .status(
                        Stage::Synthesize,
                        format!("Could not process results for \"{}\": {}", query.query, e),
                    )
                    .await?;
                emitter.flush().await?;
                return Ok(base);
            }
            Err(e) => return Err(e),
        };
        let Synthesis {
            learnings,
            follow_up_questions,
        } = synthesis;

        let mut local = base;
        local.extend_urls(hits.iter().map(|h| h.url.as_str()));
        let added = local.extend_learnings(&learnings);
        emitter
            .status(
                Stage::Synthesize,
                format!(
                    "Extracted {} learnings ({} new), {} follow-up questions",
                    learnings.len(),
                    added,
                    follow_up_questions.len()
                ),
            )
            .await?;

        if !follow_up_questions.is_empty() && frame.level + 1 < frame.depth {
            let child = Frame {
                topic: follow_up_topic(&query.research_goal, &follow_up_questions),
                breadth: frame.breadth.div_ceil(2),
                depth: frame.depth,
                level: frame.level + 1,
            };
            emitter
                .status(
                    Stage::Plan,
                    format!(
                        "Diving deeper with breadth {} (level {} of {})…",
                        child.breadth,
                        child.level + 1,
                        child.depth
                    ),
                )
                .await?;
            let deeper = self
                .research_level(child, local.snapshot(), emitter, cancel)
                .await?;
            local.merge(&deeper);
        }
        emitter.flush().await?;
        Ok(local)
    }
}
