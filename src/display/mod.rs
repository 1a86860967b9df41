//! Human-readable rendering of search results and generated answers


use crate::session::{GeneratedAnswer, SearchResponse};

/// Longest passage excerpt shown per hit, in characters
pub const EXCERPT_CHARS: usize = 400;

const NO_MATCHES: &str = "No matching pages found.";

/// Render a search response, one block per hit, most similar first
#[inline]
pub fn format_search_results(response: &SearchResponse) -> String {
    let mut lines = vec![format!("Results for \"{}\":", response.query)];

    if response.hits.is_empty() {
        lines.push(NO_MATCHES.to_string());
        return lines.join("\n");
    }

    for (rank, hit) in response.hits.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!(
            "{}. {} (page {})",
            rank + 1,
            hit.metadata.source,
            hit.metadata.chunk_number
        ));
        lines.push(format!(
            "   similarity {:.4}, distance {:.4}",
            hit.similarity, hit.distance
        ));
        lines.push(format!("   {}", excerpt(&hit.metadata.text, EXCERPT_CHARS)));
    }

    lines.join("\n")
}

/// Render a generated answer followed by the passages it was built from
#[inline]
pub fn format_generated_answer(answer: &GeneratedAnswer) -> String {
    let sources = if answer.response.hits.is_empty() {
        NO_MATCHES.to_string()
    } else {
        answer
            .response
            .hits
            .iter()
            .map(|hit| format!("  - {}", hit.id))
            .collect::<Vec<_>>()
            .join("\n")
    };

    [
        format!("Task: {}", answer.task),
        String::new(),
        answer.generated.trim().to_string(),
        String::new(),
        format!("Based on {} passages:", answer.response.hits.len()),
        sources,
    ]
    .join("\n")
}

#[inline]
pub fn print_search_results(response: &SearchResponse) {
    println!("{}", format_search_results(response));
}

#[inline]
pub fn print_generated_answer(answer: &GeneratedAnswer) {
    println!("{}", format_generated_answer(answer));
}

/// Collapse whitespace and cut `text` to at most `max_chars` characters
fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
