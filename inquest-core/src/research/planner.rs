//! Query planner: one model call per research level.

use super::call::{Emitter, ModelCaller};
use super::prompts::{FALLBACK_GOAL, PLANNER_SYSTEM, planner_prompt};
use crate::error::ResearchError;
use crate::types::{ModelRequest, PlannedQuery, Stage};
use serde::Deserialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    queries: Vec<PlannedQuery>,
}

/// Ask the model for at most `max_queries` search queries about `topic`.
///
/// Never returns an empty list: an unusable reply falls back to the topic itself.
pub async fn plan(
    caller: &ModelCaller,
    topic: &str,
    prior_learnings: &[String],
    max_queries: usize,
    emitter: &mut Emitter,
    cancel: &CancellationToken,
) -> Result<Vec<PlannedQuery>, ResearchError> {
    let request = ModelRequest::prompt(
        PLANNER_SYSTEM,
        planner_prompt(topic, prior_learnings, max_queries),
    );
    let response = caller
        .extract(request, Stage::Plan, emitter, cancel, PlanResponse::default())
        .await?;
    let queries = finalize_plan(topic, response.queries, max_queries);
    debug!(count = queries.len(), "Planned queries");
    Ok(queries)
}

/// Trim, drop blanks, dedup by query text, cap at `max_queries`, and fall
/// back to the topic when nothing usable is left.
pub fn finalize_plan(
    topic: &str,
    queries: Vec<PlannedQuery>,
    max_queries: usize,
) -> Vec<PlannedQuery> {
    let mut seen = HashSet::new();
    let planned: Vec<PlannedQuery> = queries
        .into_iter()
        .map(|q| PlannedQuery::new(q.query.trim(), q.research_goal.trim()))
        .filter(|q| !q.query.is_empty() && seen.insert(q.query.clone()))
        .take(max_queries.max(1))
        .collect();

    if planned.is_empty() {
        return vec![PlannedQuery::new(topic, FALLBACK_GOAL)];
    }
    planned
}
