//! Prompt text for the planner, synthesizer, and report calls.

use crate::types::SearchHit;

pub const PLANNER_SYSTEM: &str = "You are an expert research assistant who helps users investigate topics in depth. \
Given the user's prompt, generate web search queries that will help research the topic.";

pub const SYNTHESIZER_SYSTEM: &str =
    "You are an expert research assistant who is skilled at extracting valuable information from search results.";

pub const REPORT_SYSTEM: &str = "You are an expert research assistant who writes detailed research reports from collected information. \
Make sure the report is complete and clearly structured.";

pub const FALLBACK_GOAL: &str = "research the original query";

/// Prompt asking for up to `max_queries` unique search queries.
pub fn planner_prompt(topic: &str, prior_learnings: &[String], max_queries: usize) -> String {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of web search queries to research the topic. \
Return a maximum of {max_queries} queries, but feel free to return fewer if the original prompt is clear. \
Make sure each query is unique and not similar to the others.\n\n\
User prompt: {topic}\n"
    );
    if !prior_learnings.is_empty() {
        prompt.push_str(
            "\nHere are some learnings from previous research, use them to generate more specific queries:\n",
        );
        prompt.push_str(&prior_learnings.join("\n"));
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRespond with JSON only, in this format:\n\
{\n  \"queries\": [\n    {\n      \"query\": \"the search query\",\n      \
\"researchGoal\": \"the goal of this query and how to take the research further once results are found\"\n    }\n  ]\n}",
    );
    prompt
}

/// Prompt asking for learnings and follow-up questions over search snippets.
pub fn synthesizer_prompt(query: &str, hits: &[SearchHit], max_learnings: usize) -> String {
    let contents = hits
        .iter()
        .map(|h| h.snippet.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Given the following contents from a search for the query \"{query}\", generate a list of learnings. \
Return a maximum of {max_learnings} learnings, but feel free to return fewer if the contents are clear. \
Make sure each learning is unique and not similar to the others. Learnings should be concise and to the point, \
as detailed and information dense as possible. Include any entities such as people, places, companies and products, \
and any exact metrics, numbers, or dates. The learnings will be used to research the topic further.\n\n\
{contents}\n\n\
Respond with JSON only, in this format:\n\
{{\n  \"learnings\": [\"learning 1\", \"learning 2\"],\n  \
\"followUpQuestions\": [\"follow-up question 1\", \"follow-up question 2\"]\n}}"
    )
}

/// Prompt for the final long-form report.
pub fn report_prompt(topic: &str, learnings: &[String]) -> String {
    let numbered = learnings
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {}", i + 1, l))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Using the user prompt and the research learnings below, write a thorough research report. Requirements:\n\
1. The report should be long, at least three pages\n\
2. Include every important learning\n\
3. Use clear headings and subsections\n\
4. Support statements with specific data\n\
5. Keep the argument logically coherent\n\n\
User prompt: {topic}\n\n\
Learnings:\n{numbered}\n\n\
Write the report in Markdown with this structure:\n\
1. Research overview\n\
2. Key findings\n\
3. Detailed analysis\n\
4. Conclusions and recommendations"
    )
}

/// Topic for a recursive level built from a branch's goal and follow-ups.
pub fn follow_up_topic(research_goal: &str, questions: &[String]) -> String {
    let mut topic = format!(
        "Previous research goal: {}\nFollow-up research directions:",
        research_goal.trim()
    );
    for q in questions {
        topic.push_str("\n- ");
        topic.push_str(q.trim());
    }
    topic
}

/// Deterministic sources section appended after the report.
pub fn sources_section(urls: &[String]) -> String {
    if urls.is_empty() {
        return "\n\n## Sources\n_No sources were collected._\n".to_string();
    }
    let list = urls
        .iter()
        .map(|u| format!("- {}", u))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Sources\n{}\n", list)
}
