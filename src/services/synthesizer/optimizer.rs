//! Token-budget compression for synthesized documents.
//!
//! Steps run in a fixed order and stop as soon as the document fits.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

/// Heading of the section that is sacrificed first.
pub const ADDITIONAL_CONTEXT_HEADING: &str = "## Additional Context";

/// Lines kept from each fenced code block.
const CODE_BLOCK_KEEP_LINES: usize = 3;

const CODE_ELISION: &str = "...";
const CONTEXT_ELISION: &str = "\n\n_[Additional context truncated to fit the token budget]_\n";

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());
static CODE_BLOCKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```([^\n]*)\n(.*?)```").unwrap());

/// Token estimate for documents: characters / 4.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStep {
    CollapseBlankLines,
    ShortenCodeBlocks,
    TruncateAdditionalContext,
}

impl OptimizationStep {
    pub const ORDER: [OptimizationStep; 3] = [
        OptimizationStep::CollapseBlankLines,
        OptimizationStep::ShortenCodeBlocks,
        OptimizationStep::TruncateAdditionalContext,
    ];

    fn apply(&self, text: &str, budget: usize) -> String {
        match self {
            OptimizationStep::CollapseBlankLines => collapse_blank_lines(text),
            OptimizationStep::ShortenCodeBlocks => shorten_code_blocks(text),
            OptimizationStep::TruncateAdditionalContext => truncate_additional_context(text, budget),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Optimized {
    pub content: String,
    pub token_count: usize,
    pub applied_steps: Vec<OptimizationStep>,
}

/// Shrink `text` toward `budget` tokens.
pub fn optimize(text: String, budget: usize) -> Optimized {
    let mut content = text;
    let mut applied_steps = Vec::new();

    for step in OptimizationStep::ORDER {
        if estimate_tokens(&content) <= budget {
            break;
        }
        content = step.apply(&content, budget);
        applied_steps.push(step);
        debug!(step = ?step, tokens = estimate_tokens(&content), budget, "Applied optimization step");
    }

    Optimized {
        token_count: estimate_tokens(&content),
        content,
        applied_steps,
    }
}

/// Runs of blank lines become a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUNS.replace_all(text, "\n\n").into_owned()
}

/// Keep the first lines of each fenced block and mark the rest elided.
pub fn shorten_code_blocks(text: &str) -> String {
    CODE_BLOCKS
        .replace_all(text, |caps: &Captures| {
            let lines: Vec<&str> = caps[2].lines().collect();
            if lines.len() <= CODE_BLOCK_KEEP_LINES {
                return caps[0].to_string();
            }
            format!(
                "```{}\n{}\n{}\n```",
                &caps[1],
                lines[..CODE_BLOCK_KEEP_LINES].join("\n"),
                CODE_ELISION
            )
        })
        .into_owned()
}

/// Offset of the additional context heading, matched as a whole line.
pub fn additional_context_offset(text: &str) -> Option<usize> {
    text.match_indices(ADDITIONAL_CONTEXT_HEADING)
        .map(|(start, _)| start)
        .find(|&start| {
            let line_start = start == 0 || text[..start].ends_with('\n');
            let rest = &text[start + ADDITIONAL_CONTEXT_HEADING.len()..];
            line_start && (rest.is_empty() || rest.starts_with('\n'))
        })
}

/// Cut the additional context body so the document fits, down to nothing.
pub fn truncate_additional_context(text: &str, budget: usize) -> String {
    let Some(start) = additional_context_offset(text) else {
        return text.to_string();
    };
    let body_start = start + ADDITIONAL_CONTEXT_HEADING.len();
    let head = &text[..body_start];
    let body = &text[body_start..];

    let budget_chars = budget.saturating_mul(4);
    let fixed = head.chars().count() + CONTEXT_ELISION.chars().count();
    let room = budget_chars.saturating_sub(fixed);

    if room == 0 {
        return format!("{}\n", head);
    }

    let kept: String = body.chars().take(room).collect();
    format!("{}{}{}", head, kept.trim_end(), CONTEXT_ELISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abc"), 0);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n\nc"), "a\n\nb\n\nc");
        assert_eq!(collapse_blank_lines("a\n  \n\t\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_shorten_code_blocks() {
        let text = "intro\n```text\n1\n2\n3\n4\n5\n```\nafter\n```\nshort\n```";
        let shortened = shorten_code_blocks(text);
        assert_eq!(
            shortened,
            "intro\n```text\n1\n2\n3\n...\n```\nafter\n```\nshort\n```"
        );
    }

    #[test]
    fn test_within_budget_is_untouched() {
        let text = "a\n\n\n\nb".to_string();
        let optimized = optimize(text.clone(), 100);
        assert_eq!(optimized.content, text);
        assert!(optimized.applied_steps.is_empty());
    }

    #[test]
    fn test_stops_after_first_sufficient_step() {
        // 400 chars of content plus a long run of blank lines
        let text = format!("{}{}{}", "x".repeat(200), "\n".repeat(400), "y".repeat(200));
        let optimized = optimize(text, 150);
        assert_eq!(optimized.applied_steps, vec![OptimizationStep::CollapseBlankLines]);
        assert!(optimized.token_count <= 150);
    }

    #[test]
    fn test_applies_all_steps_in_order() {
        let code: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        let text = format!(
            "# Doc\n\n\n\nIntro\n\n```\n{}```\n\n{}\n\n{}",
            code,
            ADDITIONAL_CONTEXT_HEADING,
            "transcript words ".repeat(5000)
        );
        let optimized = optimize(text, 8000 / 20);

        assert_eq!(optimized.applied_steps, OptimizationStep::ORDER.to_vec());
        assert!(optimized.token_count <= 400);
        assert!(optimized.content.contains(ADDITIONAL_CONTEXT_HEADING));
        assert!(optimized.content.contains("line 2\n..."));
    }

    #[test]
    fn test_truncation_can_remove_body_entirely() {
        let text = format!("{}\n{}\n{}", "h".repeat(100), ADDITIONAL_CONTEXT_HEADING, "z".repeat(500));
        let truncated = truncate_additional_context(&text, 10);
        assert!(truncated.ends_with(&format!("{}\n", ADDITIONAL_CONTEXT_HEADING)));
        assert!(!truncated.contains('z'));
    }

    #[test]
    fn test_heading_must_be_a_whole_line() {
        let text = format!(
            "Product: see {} below\n\n{}\n\nbody",
            ADDITIONAL_CONTEXT_HEADING, ADDITIONAL_CONTEXT_HEADING
        );
        let offset = additional_context_offset(&text).unwrap();
        assert_eq!(offset, text.rfind(ADDITIONAL_CONTEXT_HEADING).unwrap());
        assert_eq!(additional_context_offset("no heading here"), None);
    }

    #[test]
    fn test_truncation_keeps_sections_before_real_heading() {
        let text = format!(
            "## Product Context\n\nWe wrote {} in an answer\n\n## Architecture\n\nLayered\n\n{}\n\n{}",
            ADDITIONAL_CONTEXT_HEADING,
            ADDITIONAL_CONTEXT_HEADING,
            "z".repeat(2000)
        );
        let truncated = truncate_additional_context(&text, 60);
        assert!(truncated.contains("## Architecture\n\nLayered"));
        assert!(truncated.chars().filter(|c| *c == 'z').count() < 2000);
    }
}
