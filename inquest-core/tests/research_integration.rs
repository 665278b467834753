//! End-to-end research runs against scripted model and search providers.

use inquest_core::brain::{MockLlmProvider, MockReply};
use inquest_core::config::{ResearchConfig, SearchConfig};
use inquest_core::error::{LlmError, ResearchError, SearchError};
use inquest_core::mux::{EventSink, OutputMultiplexer, WireFormat};
use inquest_core::research::{CallStats, ResearchEngine, ResearchOutcome};
use inquest_core::search::{MockSearchProvider, SearchAdapter};
use inquest_core::types::{ModelRequest, ResearchRequest, RunEvent, SearchHit, Stage};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// --- Helpers ---

fn is_planner(req: &ModelRequest) -> bool {
    req.last_user_text()
        .is_some_and(|p| p.contains("generate a list of web search queries"))
}

fn is_report(req: &ModelRequest) -> bool {
    req.last_user_text()
        .is_some_and(|p| p.contains("write a thorough research report"))
}

/// The `N` in "Return a maximum of N queries".
fn max_queries(req: &ModelRequest) -> usize {
    let prompt = req.last_user_text().unwrap_or_default();
    prompt
        .split("maximum of ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn query_from_synth_prompt(req: &ModelRequest) -> String {
    let prompt = req.last_user_text().unwrap_or_default();
    prompt
        .split("for the query \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string()
}

fn plan_json(queries: &[String]) -> String {
    let items: Vec<serde_json::Value> = queries
        .iter()
        .map(|q| serde_json::json!({"query": q, "researchGoal": format!("goal of {q}")}))
        .collect();
    serde_json::json!({ "queries": items }).to_string()
}

fn synth_json(learnings: &[&str], follow_ups: &[&str]) -> String {
    serde_json::json!({ "learnings": learnings, "followUpQuestions": follow_ups }).to_string()
}

/// Planner returns `max` unique queries; synthesizer output chosen by `synth`.
fn scripted_provider<F>(synth: F) -> Arc<MockLlmProvider>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
{
    let counter = AtomicUsize::new(0);
    Arc::new(
        MockLlmProvider::with_handler(move |req| {
            if is_planner(req) {
                let n = max_queries(req);
                let queries: Vec<String> = (0..n)
                    .map(|_| format!("q{}", counter.fetch_add(1, Ordering::SeqCst)))
                    .collect();
                Ok(MockReply::text(plan_json(&queries)))
            } else if is_report(req) {
                Ok(MockReply::with_reasoning("outlining", "# Report\nBody."))
            } else {
                synth(&query_from_synth_prompt(req)).map(MockReply::text)
            }
        })
        .chunked(7),
    )
}

fn hits_for(query: &str) -> Vec<SearchHit> {
    vec![
        SearchHit::new(format!("https://{query}.example/1"), "one", format!("{query} snippet one")),
        SearchHit::new(format!("https://{query}.example/2"), "two", format!("{query} snippet two")),
    ]
}

fn engine(
    provider: Arc<MockLlmProvider>,
    search: Arc<MockSearchProvider>,
    concurrency: usize,
) -> ResearchEngine {
    let config = ResearchConfig {
        concurrency,
        ..ResearchConfig::default()
    };
    ResearchEngine::new(
        provider,
        SearchAdapter::new(search, &SearchConfig::default()),
        config,
    )
}

fn request(topic: &str, breadth: usize, depth: usize) -> ResearchRequest {
    ResearchRequest {
        topic: topic.to_string(),
        breadth,
        depth,
    }
}

async fn drain(mut rx: mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

async fn research(
    engine: &ResearchEngine,
    req: ResearchRequest,
) -> (Result<ResearchOutcome, ResearchError>, Vec<RunEvent>) {
    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(16, cancel.clone());
    let collector = tokio::spawn(drain(rx));
    let result = engine.research(&req, &sink, &cancel).await;
    drop(sink);
    (result, collector.await.unwrap())
}

fn planner_requests(provider: &MockLlmProvider) -> Vec<ModelRequest> {
    provider.requests().into_iter().filter(is_planner).collect()
}

fn status_notes(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.event.kind() == "status")
        .map(|e| e.event.text().to_string())
        .collect()
}

fn assert_unique(items: &[String]) {
    let set: HashSet<&String> = items.iter().collect();
    assert_eq!(set.len(), items.len(), "duplicates in {:?}", items);
}

// --- Scenarios ---

#[tokio::test]
async fn test_zero_hits_short_circuits_synthesizer() {
    let provider = scripted_provider(|_| Ok(synth_json(&["never"], &[])));
    let search = Arc::new(MockSearchProvider::empty());
    let engine = engine(provider.clone(), search.clone(), 1);

    let (result, _) = research(&engine, request("X", 1, 1)).await;
    assert_eq!(result.unwrap(), ResearchOutcome::default());
    assert_eq!(
        engine.stats(),
        CallStats {
            plan_calls: 1,
            search_calls: 1,
            synthesize_calls: 0,
            report_calls: 0,
        }
    );
    assert_eq!(search.call_count(), 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_failing_search_branch_does_not_abort_run() {
    let provider = scripted_provider(|q| Ok(synth_json(&[&format!("fact from {q}")], &[])));
    let search = Arc::new(MockSearchProvider::with_handler(|query| {
        if query == "q1" {
            Err(SearchError::Status { status: 500 })
        } else {
            Ok(hits_for(query))
        }
    }));
    let engine = engine(provider, search, 1);

    let (result, events) = research(&engine, request("topic", 3, 1)).await;
    let outcome = result.unwrap();
    assert_eq!(outcome.learnings, vec!["fact from q0", "fact from q2"]);
    assert_eq!(outcome.visited_urls.len(), 4);
    assert!(outcome.visited_urls.iter().all(|u| !u.contains("q1.")));
    assert!(
        status_notes(&events)
            .iter()
            .any(|n| n.contains("q1") && n.contains("500"))
    );
}

#[tokio::test]
async fn test_recursion_halves_breadth_and_stops_at_depth() {
    // Only the first query of the root level yields follow-up questions.
    let provider = scripted_provider(|q| {
        if q == "q0" {
            Ok(synth_json(&["root fact"], &["why?", "how?"]))
        } else {
            Ok(synth_json(&[&format!("fact {q}")], &[]))
        }
    });
    let search = Arc::new(MockSearchProvider::with_handler(|q| Ok(hits_for(q))));
    let engine = engine(provider.clone(), search, 1);

    let (result, _) = research(&engine, request("topic", 4, 2)).await;
    result.unwrap();

    let plans = planner_requests(&provider);
    assert_eq!(plans.len(), 2);
    assert_eq!(max_queries(&plans[0]), 4);
    assert_eq!(max_queries(&plans[1]), 2);

    let child_prompt = plans[1].last_user_text().unwrap();
    assert!(child_prompt.contains(
        "Previous research goal: goal of q0\nFollow-up research directions:\n- why?\n- how?"
    ));
    // Learnings found so far are handed to the deeper planner.
    assert!(child_prompt.contains("root fact"));
}

#[tokio::test]
async fn test_no_planner_call_at_or_beyond_depth() {
    let provider = scripted_provider(|q| Ok(synth_json(&[&format!("fact {q}")], &["more?"])));
    let search = Arc::new(MockSearchProvider::with_handler(|q| Ok(hits_for(q))));
    let engine = engine(provider.clone(), search, 1);

    let (result, _) = research(&engine, request("topic", 2, 3)).await;
    let outcome = result.unwrap();

    // Level 0: 1 plan (2 queries). Level 1: 2 plans (1 query each).
    // Level 2: 2 plans (1 query each), and no level 3.
    let plans = planner_requests(&provider);
    assert_eq!(plans.len(), 5);
    assert!(plans.iter().skip(1).all(|p| max_queries(p) == 1));
    assert_eq!(engine.stats().synthesize_calls, 6);
    assert_eq!(outcome.learnings.len(), 6);
}

#[tokio::test]
async fn test_overlapping_branches_are_deduplicated() {
    let provider = scripted_provider(|_| Ok(synth_json(&["same fact", "same fact", "other"], &["again?"])));
    let search = Arc::new(MockSearchProvider::with_hits(vec![
        SearchHit::new("https://shared.example/page", "S", "shared"),
        SearchHit::new("https://Shared.example/page#frag", "S", "shared again"),
        SearchHit::new("https://unique.example/", "U", "unique"),
    ]));
    let engine = engine(provider, search, 1);

    let (result, _) = research(&engine, request("topic", 3, 2)).await;
    let outcome = result.unwrap();
    assert_eq!(outcome.learnings, vec!["same fact", "other"]);
    assert_eq!(
        outcome.visited_urls,
        vec!["https://shared.example/page", "https://unique.example/"]
    );
    assert_unique(&outcome.learnings);
    assert_unique(&outcome.visited_urls);
}

#[tokio::test]
async fn test_unparseable_plan_falls_back_to_topic() {
    let provider = Arc::new(MockLlmProvider::with_handler(|req| {
        if is_planner(req) {
            Ok(MockReply::text("I would search for a few things."))
        } else {
            Ok(MockReply::text(synth_json(&["fallback fact"], &[])))
        }
    }));
    let search = Arc::new(MockSearchProvider::with_handler(|_| Ok(hits_for("x"))));
    let engine = engine(provider, search.clone(), 1);

    let (result, _) = research(&engine, request("quantum batteries", 3, 1)).await;
    assert_eq!(result.unwrap().learnings, vec!["fallback fact"]);
    assert_eq!(search.queries(), vec!["quantum batteries"]);
}

#[tokio::test]
async fn test_planner_failure_keeps_state_and_reports() {
    let provider = Arc::new(MockLlmProvider::with_handler(|req| {
        if is_planner(req) {
            Err(LlmError::RateLimited {
                retry_after_secs: 30,
            })
        } else {
            Ok(MockReply::text("unused"))
        }
    }));
    let search = Arc::new(MockSearchProvider::empty());
    let engine = engine(provider, search.clone(), 1);

    let (result, events) = research(&engine, request("topic", 2, 2)).await;
    assert_eq!(result.unwrap(), ResearchOutcome::default());
    assert_eq!(search.call_count(), 0);
    assert!(
        status_notes(&events)
            .iter()
            .any(|n| n.starts_with("Planning failed"))
    );
}

#[tokio::test]
async fn test_synthesizer_failure_drops_only_that_query() {
    let provider = scripted_provider(|q| {
        if q == "q0" {
            Err(LlmError::Streaming {
                message: "connection reset".into(),
            })
        } else {
            Ok(synth_json(&[&format!("fact {q}")], &[]))
        }
    });
    let search = Arc::new(MockSearchProvider::with_handler(|q| Ok(hits_for(q))));
    let engine = engine(provider, search, 1);

    let (result, _) = research(&engine, request("topic", 2, 1)).await;
    let outcome = result.unwrap();
    assert_eq!(outcome.learnings, vec!["fact q1"]);
    assert_eq!(
        outcome.visited_urls,
        vec!["https://q1.example/1", "https://q1.example/2"]
    );
}

#[tokio::test]
async fn test_concurrent_levels_match_sequential_results() {
    let synth = |q: &str| -> Result<String, LlmError> {
        Ok(synth_json(&[&format!("fact {q}"), "common"], &["deeper?"]))
    };
    let seq_provider = scripted_provider(synth);
    let par_provider = scripted_provider(synth);
    let search = || Arc::new(MockSearchProvider::with_handler(|q| Ok(hits_for(q))));

    let sequential = engine(seq_provider, search(), 1);
    let parallel = engine(par_provider, search(), 4);
    let (seq, _) = research(&sequential, request("topic", 3, 2)).await;
    let (par, events) = research(&parallel, request("topic", 3, 2)).await;
    let (seq, par) = (seq.unwrap(), par.unwrap());

    let as_set = |v: &[String]| v.iter().cloned().collect::<HashSet<_>>();
    assert_eq!(as_set(&seq.learnings), as_set(&par.learnings));
    assert_eq!(as_set(&seq.visited_urls), as_set(&par.visited_urls));
    assert_eq!(sequential.stats(), parallel.stats());
    assert_unique(&par.learnings);

    // Batched delivery: every synthesizer reply arrives as one unbroken run of
    // deltas, so each full JSON document appears verbatim in the stream.
    let synth_text: String = events
        .iter()
        .filter(|e| e.stage == Stage::Synthesize && e.event.kind() == "content")
        .map(|e| e.event.text())
        .collect();
    for learning in par.learnings.iter().filter(|l| l.starts_with("fact ")) {
        let q = learning.trim_start_matches("fact ");
        assert!(
            synth_text.contains(&synth(q).unwrap()),
            "reply for {q} was interleaved"
        );
    }
}

#[tokio::test]
async fn test_full_run_streams_report_with_sources() {
    let provider = scripted_provider(|q| Ok(synth_json(&[&format!("fact {q}")], &[])));
    let search = Arc::new(MockSearchProvider::with_handler(|q| Ok(hits_for(q))));
    let engine = engine(provider, search, 1);

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(16, cancel.clone());
    let collector = tokio::spawn(async move {
        let mut mux = OutputMultiplexer::new(WireFormat::Markers);
        let mut out = String::new();
        for ev in drain(rx).await {
            out.push_str(&mux.encode(&ev));
        }
        out.push_str(&mux.finish());
        out
    });

    let summary = engine
        .run(&request("topic", 1, 1), &sink, &cancel)
        .await
        .unwrap();
    drop(sink);
    let out = collector.await.unwrap();

    assert_eq!(summary.stats.report_calls, 1);
    assert_eq!(summary.outcome.learnings, vec!["fact q0"]);
    assert!(summary.report.starts_with("# Report\nBody."));
    assert!(summary.report.ends_with("## Sources\n- https://q0.example/1\n- https://q0.example/2\n"));

    // Research trace inside one span, then the report's own reasoning span, then the report.
    assert!(out.starts_with("<think>\n> Planning up to 1 queries"));
    let report_start = out.find("# Report").unwrap();
    let (trace, report) = out.split_at(report_start);
    assert!(trace.contains("</think>\n\n<think>\noutlining\n</think>\n\n"));
    assert!(trace.contains("> Found 2 results\n"));
    assert!(report.ends_with("- https://q0.example/2\n"));
}

#[tokio::test]
async fn test_cancellation_stops_run_before_report() {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let provider = scripted_provider(|_| Ok(synth_json(&["x"], &[])));
    let search = Arc::new(MockSearchProvider::with_handler(move |_| {
        token.cancel();
        Ok(Vec::new())
    }));
    let engine = engine(provider.clone(), search, 1);

    let (sink, rx) = EventSink::channel(16, cancel.clone());
    let collector = tokio::spawn(drain(rx));
    let result = engine.run(&request("topic", 1, 1), &sink, &cancel).await;
    drop(sink);
    collector.await.unwrap();

    assert!(matches!(result, Err(ResearchError::Cancelled)));
    assert!(!provider.requests().iter().any(is_report));
}

#[tokio::test]
async fn test_closed_receiver_cancels_run() {
    let provider = scripted_provider(|_| Ok(synth_json(&["x"], &[])));
    let search = Arc::new(MockSearchProvider::empty());
    let engine = engine(provider.clone(), search, 1);

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(4, cancel.clone());
    drop(rx);
    let result = engine.run(&request("topic", 2, 2), &sink, &cancel).await;

    assert!(matches!(result, Err(ResearchError::Cancelled)));
    assert!(cancel.is_cancelled());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_report_failure_is_fatal() {
    let provider = Arc::new(MockLlmProvider::with_handler(|req| {
        if is_report(req) {
            Err(LlmError::ApiRequest {
                message: "HTTP 400: context too long".into(),
            })
        } else {
            Ok(MockReply::text(plan_json(&["only".to_string()])))
        }
    }));
    let engine = engine(provider, Arc::new(MockSearchProvider::empty()), 1);

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(16, cancel.clone());
    let collector = tokio::spawn(drain(rx));
    let result = engine.run(&request("topic", 1, 1), &sink, &cancel).await;
    drop(sink);
    collector.await.unwrap();

    assert!(matches!(result, Err(ResearchError::Report(LlmError::ApiRequest { .. }))));
}
