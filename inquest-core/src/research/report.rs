//! Final report: one live-streamed model call plus a deterministic sources section.

use super::call::{Emitter, ModelCaller};
use super::prompts::{REPORT_SYSTEM, report_prompt, sources_section};
use crate::error::ResearchError;
use crate::types::{ModelRequest, RunEvent, Stage, StreamEvent};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Stream the report for `topic` and return its full content text, sources included.
pub async fn write_report(
    caller: &ModelCaller,
    topic: &str,
    learnings: &[String],
    urls: &[String],
    emitter: &mut Emitter,
    cancel: &CancellationToken,
) -> Result<String, ResearchError> {
    info!(
        learnings = learnings.len(),
        urls = urls.len(),
        "Writing final report"
    );
    emitter
        .status(
            Stage::Report,
            format!(
                "Writing report from {} learnings and {} sources…",
                learnings.len(),
                urls.len()
            ),
        )
        .await?;

    let request = ModelRequest::prompt(REPORT_SYSTEM, report_prompt(topic, learnings));
    let output = caller
        .call(request, Stage::Report, emitter, cancel, |_| {})
        .await
        .map_err(|e| match e {
            ResearchError::Llm(inner) => ResearchError::Report(inner),
            other => other,
        })?;

    let sources = sources_section(urls);
    emitter
        .emit(RunEvent::new(
            Stage::Report,
            StreamEvent::ContentDelta(sources.clone()),
        ))
        .await?;
    emitter.flush().await?;

    let mut report = output.content;
    report.push_str(&sources);
    Ok(report)
}
