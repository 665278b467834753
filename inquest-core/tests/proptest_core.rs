//! Property-based tests for core components using proptest.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use inquest_core::StreamEvent;
use inquest_core::research::demux::demux_all;
use inquest_core::research::{ResearchState, StructuredExtractor, TokenDemux};
use inquest_core::search::normalize_query;

/// Merge adjacent events of the same kind; chunking must not matter after this.
fn coalesce(events: Vec<StreamEvent>) -> Vec<(&'static str, String)> {
    let mut out: Vec<(&'static str, String)> = Vec::new();
    for ev in events {
        let kind = ev.kind();
        let text = ev.text().to_string();
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some((k, prev)) if *k == kind => prev.push_str(&text),
            _ => out.push((kind, text)),
        }
    }
    out
}

/// Split `text` at the given char offsets.
fn split_at_chars(text: &str, cuts: &[usize]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (chars.len() + 1)).collect();
    points.push(0);
    points.push(chars.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|w| chars[w[0]..w[1]].iter().collect())
        .collect()
}

fn marker_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "<think>", "</think>", "a", "b c", "<", "</", "think", ">", "é", "\n",
        ]),
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

fn plain_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,é\n]{0,60}"
}

// --- Demultiplexer properties ---

proptest! {
    #[test]
    fn demux_is_chunking_invariant(
        text in marker_soup(),
        cuts in prop::collection::vec(0usize..400, 0..12),
    ) {
        let whole = coalesce(demux_all([text.as_str()]));
        let chunks = split_at_chars(&text, &cuts);
        let pieces = coalesce(demux_all(chunks.iter().map(String::as_str)));
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn demux_text_without_markers_is_content(text in plain_text()) {
        let events = coalesce(demux_all([text.as_str()]));
        if text.is_empty() {
            prop_assert!(events.is_empty());
        } else {
            prop_assert_eq!(events, vec![("content", text.clone())]);
        }
    }

    #[test]
    fn demux_splits_reasoning_from_answer(
        reasoning in plain_text(),
        answer in plain_text(),
        cuts in prop::collection::vec(0usize..200, 0..8),
    ) {
        let text = format!("<think>{}</think>{}", reasoning, answer);
        let chunks = split_at_chars(&text, &cuts);
        let events = demux_all(chunks.iter().map(String::as_str));

        let got_reasoning: String = events
            .iter()
            .filter(|e| e.kind() == "reasoning")
            .map(|e| e.text())
            .collect();
        let got_answer: String = events
            .iter()
            .filter(|e| e.kind() == "content")
            .map(|e| e.text())
            .collect();
        prop_assert_eq!(got_reasoning, reasoning);
        prop_assert_eq!(got_answer, answer);
    }

    #[test]
    fn demux_unterminated_reasoning_is_closed(
        reasoning in "[a-z ]{1,40}",
        cuts in prop::collection::vec(0usize..60, 0..6),
    ) {
        let text = format!("<think>{}", reasoning);
        let mut demux = TokenDemux::default();
        let mut events = Vec::new();
        for chunk in split_at_chars(&text, &cuts) {
            events.extend(demux.push(&chunk));
        }
        events.extend(demux.finish());

        prop_assert!(demux.was_unterminated());
        prop_assert_eq!(coalesce(events), vec![("reasoning", reasoning.clone())]);
    }

    #[test]
    fn demux_never_loses_text(text in marker_soup()) {
        let events = demux_all([text.as_str()]);
        let emitted: usize = events.iter().map(|e| e.text().len()).sum();
        let markers = text.matches("</think>").count() * "</think>".len()
            + text.matches("<think>").count() * "<think>".len();
        prop_assert_eq!(emitted + markers, text.len());
    }
}

// --- Structured extraction properties ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Plan {
    queries: Vec<String>,
}

proptest! {
    #[test]
    fn extractor_matches_final_parse(
        queries in prop::collection::vec("[a-z ]{0,20}", 0..6),
        cuts in prop::collection::vec(0usize..300, 0..10),
        fenced in any::<bool>(),
    ) {
        let plan = Plan { queries };
        let json = serde_json::to_string_pretty(&plan).unwrap();
        let text = if fenced { format!("```json\n{}\n```", json) } else { json };

        let mut extractor = StructuredExtractor::<Plan>::new();
        let chunks = split_at_chars(&text, &cuts);
        for chunk in &chunks {
            extractor.push(chunk);
        }
        prop_assert_eq!(extractor.attempts(), chunks.len());
        prop_assert_eq!(extractor.into_value(), Some(plan));
    }

    #[test]
    fn extractor_falls_back_on_prose(text in "[a-zA-Z ,.]{0,80}") {
        let mut extractor = StructuredExtractor::<Plan>::new();
        extractor.push(&text);
        let fallback = Plan { queries: vec!["fallback".into()] };
        prop_assert_eq!(extractor.finish_or(fallback.clone()), fallback);
    }
}

// --- Research state properties ---

fn learning() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["alpha", "beta", " beta ", "gamma", "", "delta"])
        .prop_map(str::to_string)
}

fn url() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "https://a.example/",
        "https://A.example/",
        "https://a.example/#top",
        "https://b.example/page",
        "not a url",
        " ",
    ])
    .prop_map(str::to_string)
}

fn state_from(learnings: &[String], urls: &[String]) -> ResearchState {
    let mut state = ResearchState::new();
    state.extend_learnings(learnings);
    state.extend_urls(urls);
    state
}

proptest! {
    #[test]
    fn merge_never_duplicates(
        l1 in prop::collection::vec(learning(), 0..10),
        u1 in prop::collection::vec(url(), 0..10),
        l2 in prop::collection::vec(learning(), 0..10),
        u2 in prop::collection::vec(url(), 0..10),
    ) {
        let mut merged = state_from(&l1, &u1);
        merged.merge(&state_from(&l2, &u2));

        let learnings = merged.learnings();
        let unique: std::collections::HashSet<&String> = learnings.iter().collect();
        prop_assert_eq!(unique.len(), learnings.len());
        prop_assert!(learnings.iter().all(|l| !l.is_empty() && l.trim() == l));

        let expected: std::collections::HashSet<String> = l1
            .iter()
            .chain(&l2)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        let got: std::collections::HashSet<String> = learnings.iter().cloned().collect();
        prop_assert_eq!(got, expected);

        let keys: std::collections::HashSet<String> = merged
            .visited_urls()
            .iter()
            .map(|u| inquest_core::research::state::normalize_url(u))
            .collect();
        prop_assert_eq!(keys.len(), merged.visited_urls().len());
    }

    #[test]
    fn merge_is_idempotent_and_monotone(
        l1 in prop::collection::vec(learning(), 0..10),
        u1 in prop::collection::vec(url(), 0..10),
        l2 in prop::collection::vec(learning(), 0..10),
    ) {
        let base = state_from(&l1, &u1);
        let mut merged = base.snapshot();
        merged.merge(&state_from(&l2, &[]));

        // Everything the base knew survives, in the same order, as a prefix.
        prop_assert!(merged.learnings().starts_with(base.learnings()));
        prop_assert!(merged.visited_urls().starts_with(base.visited_urls()));

        let before = merged.clone();
        merged.merge(&before);
        prop_assert_eq!(merged, before);
    }
}

// --- Search query normalization ---

proptest! {
    #[test]
    fn normalized_query_is_bounded_and_clean(
        query in "[a-z \t\n研]{0,80}",
        max in 1usize..40,
    ) {
        let q = normalize_query(&query, max);
        prop_assert!(q.chars().count() <= max);
        prop_assert!(!q.contains("  "));
        prop_assert!(!q.contains('\n') && !q.contains('\t'));
        prop_assert_eq!(q.trim(), q.as_str());
    }
}
