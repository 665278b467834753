//! Result synthesizer: turns one query's search hits into learnings and follow-ups.

use super::call::{Emitter, ModelCaller};
use super::prompts::{SYNTHESIZER_SYSTEM, synthesizer_prompt};
use crate::error::ResearchError;
use crate::types::{ModelRequest, SearchHit, Stage};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Structured reply of one synthesizer call. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

/// Extract up to `max_learnings` learnings from `hits`.
///
/// With no hits the model is not called. Results are returned as-is;
/// dedup happens when branch states are merged.
pub async fn synthesize(
    caller: &ModelCaller,
    query: &str,
    hits: &[SearchHit],
    max_learnings: usize,
    emitter: &mut Emitter,
    cancel: &CancellationToken,
) -> Result<Synthesis, ResearchError> {
    if hits.is_empty() {
        return Ok(Synthesis::default());
    }
    let request = ModelRequest::prompt(
        SYNTHESIZER_SYSTEM,
        synthesizer_prompt(query, hits, max_learnings),
    );
    caller
        .extract(request, Stage::Synthesize, emitter, cancel, Synthesis::default())
        .await
}
