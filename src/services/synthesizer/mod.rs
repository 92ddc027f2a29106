//! Prompt synthesis.
//!
//! Turns a finished transcript into a structured technical brief:
//! 1. File each question under a topic
//! 2. Infer an architecture from answer keywords
//! 3. Render the markdown document
//! 4. Compress it to the token budget

mod document;
mod optimizer;
mod rules;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use specforge_storage::TranscriptEntry;
use tracing::info;

pub use document::{summarize, QaPair, MAX_ITEMS_PER_TOPIC, MAX_ITEM_CHARS};
pub use optimizer::{estimate_tokens, optimize, OptimizationStep, ADDITIONAL_CONTEXT_HEADING};
pub use rules::{
    categorize, detect_technologies, infer_architecture, ArchitectureBlock, ArchitecturePattern,
    ArchitectureRule, CategoryRule, Signals, Topic, ARCHITECTURE_RULES, CATEGORY_RULES,
};

/// Default token budget for synthesized documents.
pub const DEFAULT_PROMPT_TOKEN_BUDGET: usize = 8000;

/// Extras for regenerating a prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisOptions {
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub additional_requirements: Option<String>,
}

/// The finished brief.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedPrompt {
    pub content: String,
    pub token_count: usize,
    pub within_budget: bool,
    pub architecture: ArchitecturePattern,
    pub applied_steps: Vec<OptimizationStep>,
}

/// Group transcript pairs by topic, preserving order within each topic.
pub fn extract(entries: &[TranscriptEntry]) -> BTreeMap<Topic, Vec<QaPair>> {
    let mut by_topic: BTreeMap<Topic, Vec<QaPair>> = BTreeMap::new();
    for entry in entries {
        by_topic
            .entry(categorize(&entry.question))
            .or_default()
            .push(QaPair {
                question: entry.question.clone(),
                answer: entry.answer.clone(),
            });
    }
    by_topic
}

#[derive(Debug, Clone)]
pub struct PromptSynthesizer {
    token_budget: usize,
}

impl Default for PromptSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TOKEN_BUDGET)
    }
}

impl PromptSynthesizer {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    pub fn synthesize(&self, entries: &[TranscriptEntry], options: &SynthesisOptions) -> SynthesizedPrompt {
        let by_topic = extract(entries);
        let transcript: Vec<QaPair> = entries
            .iter()
            .map(|e| QaPair {
                question: e.question.clone(),
                answer: e.answer.clone(),
            })
            .collect();

        let functionality_answers = by_topic.get(&Topic::Functionality).map_or(0, Vec::len);
        let signals = Signals::detect(
            entries.iter().map(|e| e.answer.as_str()),
            functionality_answers,
        );
        let architecture = infer_architecture(&signals);

        let raw = document::render(&document::DocumentInput {
            by_topic: &by_topic,
            transcript: &transcript,
            architecture,
            options,
        });
        let raw_tokens = estimate_tokens(&raw);
        let optimized = optimize(raw, self.token_budget);

        info!(
            entries = entries.len(),
            architecture = ?architecture,
            raw_tokens,
            tokens = optimized.token_count,
            steps = optimized.applied_steps.len(),
            "Synthesized prompt"
        );

        SynthesizedPrompt {
            within_budget: optimized.token_count <= self.token_budget,
            token_count: optimized.token_count,
            content: optimized.content,
            architecture,
            applied_steps: optimized.applied_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use specforge_models::Category;

    fn entry(question: &str, answer: &str) -> TranscriptEntry {
        TranscriptEntry {
            chunk_id: "c".into(),
            category: Category::Review,
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_extract_groups_by_question_topic() {
        let entries = vec![
            entry("What specific problem does your product solve?", "Late walks"),
            entry("Who are the primary users of your product?", "Walkers"),
            entry("What are the key features users will interact with?", "Booking"),
            entry("Anything else?", "No"),
        ];
        let by_topic = extract(&entries);

        let functionality: Vec<_> = by_topic[&Topic::Functionality]
            .iter()
            .map(|p| p.answer.as_str())
            .collect();
        assert_eq!(functionality, vec!["Late walks", "Booking"]);
        assert_eq!(by_topic[&Topic::Users].len(), 1);
        assert_eq!(by_topic[&Topic::General].len(), 1);
    }

    #[test]
    fn test_synthesize_small_transcript_needs_no_optimization() {
        let entries = vec![
            entry("What is the main functionality?", "A real-time chat for dog walkers"),
            entry("Do you have any technical stack preferences?", "Rust and Postgres"),
        ];
        let prompt = PromptSynthesizer::default().synthesize(&entries, &SynthesisOptions::default());

        assert_eq!(prompt.architecture, ArchitecturePattern::EventDriven);
        assert!(prompt.applied_steps.is_empty());
        assert!(prompt.within_budget);
        assert!(prompt.content.contains("- Rust\n- PostgreSQL\n"));
    }

    #[test]
    fn test_synthesize_large_transcript_fits_budget() {
        let long_answer = "The walkers want detailed route planning and reliable payouts. ".repeat(120);
        let entries: Vec<_> = (0..20)
            .map(|i| entry(&format!("Follow-up number {}?", i), &long_answer))
            .collect();

        let prompt = PromptSynthesizer::default().synthesize(&entries, &SynthesisOptions::default());

        assert!(prompt.token_count <= DEFAULT_PROMPT_TOKEN_BUDGET);
        assert!(prompt.within_budget);
        assert_eq!(prompt.applied_steps.last(), Some(&OptimizationStep::TruncateAdditionalContext));
        assert!(prompt.content.contains("## Engineering Principles"));
    }
}
