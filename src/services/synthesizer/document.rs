//! Markdown rendering of the synthesized brief.

use std::collections::BTreeMap;

use super::optimizer::ADDITIONAL_CONTEXT_HEADING;
use super::rules::{detect_technologies, ArchitecturePattern, Topic};
use super::SynthesisOptions;

/// Longest rendered requirement item, in characters.
pub const MAX_ITEM_CHARS: usize = 300;

/// Requirement items rendered per topic.
pub const MAX_ITEMS_PER_TOPIC: usize = 8;

const ROLE: &str = "You are a senior software architect and full-stack engineer. Using the product \
discovery below, design and implement a production-ready first version of this product. Ask for \
clarification only where the requirements are contradictory.";

const PRINCIPLES: &[(&str, &str)] = &[
    ("Single Responsibility", "Each module, class and function has one reason to change."),
    ("Open/Closed", "Extend behavior through new code rather than editing stable code."),
    ("Liskov Substitution", "Implementations must be usable wherever their abstraction is expected."),
    ("Interface Segregation", "Prefer small, focused interfaces over broad ones."),
    ("Dependency Inversion", "Depend on abstractions; inject concrete services at the edges."),
    ("DRY", "Keep one authoritative implementation of each piece of knowledge."),
];

const OUTPUT_CONSTRAINTS: &[&str] = &[
    "Deliver a runnable project following the structure above.",
    "Include automated tests for every functional requirement.",
    "Document setup, configuration and deployment in a README.",
    "Validate all user input and handle errors explicitly.",
    "Keep secrets out of source control; read them from the environment.",
];

/// One answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Everything the renderer needs.
pub struct DocumentInput<'a> {
    pub by_topic: &'a BTreeMap<Topic, Vec<QaPair>>,
    pub transcript: &'a [QaPair],
    pub architecture: ArchitecturePattern,
    pub options: &'a SynthesisOptions,
}

/// Collapse whitespace and cap at [`MAX_ITEM_CHARS`].
pub fn summarize(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_ITEM_CHARS {
        return flat;
    }
    let kept: String = flat.chars().take(MAX_ITEM_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}

/// Escape lines that would otherwise open a markdown heading.
fn plain(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                format!("\\{}", trimmed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn answers<'a>(by_topic: &'a BTreeMap<Topic, Vec<QaPair>>, topic: Topic) -> &'a [QaPair] {
    by_topic.get(&topic).map(Vec::as_slice).unwrap_or(&[])
}

fn requirement_section(out: &mut String, title: &str, topics: &[Topic], by_topic: &BTreeMap<Topic, Vec<QaPair>>) {
    out.push_str(&format!("## {}\n\n", title));

    let mut any = false;
    for topic in topics {
        let pairs = answers(by_topic, *topic);
        if pairs.is_empty() {
            continue;
        }
        any = true;
        out.push_str(&format!("### {}\n\n", topic.title()));
        for pair in pairs.iter().take(MAX_ITEMS_PER_TOPIC) {
            out.push_str(&format!("- {}\n", summarize(&pair.answer)));
        }
        out.push('\n');
    }

    if !any {
        out.push_str("_No requirements were captured for this area._\n\n");
    }
}

/// Every functionality answer, flattened and capped.
fn product_context(by_topic: &BTreeMap<Topic, Vec<QaPair>>) -> Option<String> {
    let functionality = answers(by_topic, Topic::Functionality);
    if functionality.is_empty() {
        return None;
    }
    let joined = functionality
        .iter()
        .map(|p| p.answer.trim())
        .collect::<Vec<_>>()
        .join(" ");
    Some(plain(&summarize(&joined)))
}

/// Render the full, unoptimized document.
pub fn render(input: &DocumentInput<'_>) -> String {
    let mut out = String::new();
    let block = input.architecture.block();

    out.push_str("# Product Development Prompt\n\n");

    out.push_str(&format!("## Role\n\n{}\n\n", ROLE));

    out.push_str("## Product Context\n\n");
    match product_context(input.by_topic) {
        Some(context) => out.push_str(&format!("{}\n\n", context)),
        None => out.push_str("No product description was provided.\n\n"),
    }

    out.push_str("## Engineering Principles\n\n");
    for (name, description) in PRINCIPLES {
        out.push_str(&format!("- **{}**: {}\n", name, description));
    }
    out.push('\n');

    out.push_str(&format!(
        "## Architecture\n\n**Pattern:** {}\n\n- **Frontend:** {}\n- **Backend:** {}\n- **Data:** {}\n\n**Rationale:** {}\n\n",
        block.name, block.frontend, block.backend, block.data, block.rationale
    ));

    out.push_str("## Tech Stack\n\n");
    let named = detect_technologies(
        answers(input.by_topic, Topic::Technical)
            .iter()
            .map(|p| p.answer.as_str()),
    );
    let stack: Vec<&str> = if named.is_empty() {
        block.default_stack.to_vec()
    } else {
        named
    };
    for tech in stack {
        out.push_str(&format!("- {}\n", tech));
    }
    out.push('\n');

    out.push_str(&format!(
        "## Project Structure\n\n```text\n{}\n```\n\n",
        block.folder_layout
    ));

    requirement_section(&mut out, "Functional Requirements", &Topic::FUNCTIONAL, input.by_topic);
    requirement_section(&mut out, "Non-Functional Requirements", &Topic::NON_FUNCTIONAL, input.by_topic);

    out.push_str("## Output & Constraints\n\n");
    for constraint in OUTPUT_CONSTRAINTS {
        out.push_str(&format!("- {}\n", constraint));
    }
    out.push('\n');

    if !input.options.focus_areas.is_empty() {
        out.push_str("## Additional Focus Areas\n\nPlease pay special attention to:\n\n");
        for area in &input.options.focus_areas {
            let area = summarize(area);
            out.push_str(&format!(
                "- **{}**: Implement comprehensive {} measures\n",
                title_case(&area),
                area.to_lowercase()
            ));
        }
        out.push('\n');
    }

    if let Some(extra) = input
        .options
        .additional_requirements
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        out.push_str(&format!("## Additional Requirements\n\n{}\n\n", plain(extra)));
    }

    // Lowest priority; the optimizer truncates from here
    out.push_str(&format!("{}\n\n", ADDITIONAL_CONTEXT_HEADING));
    let general = answers(input.by_topic, Topic::General);
    if !general.is_empty() {
        out.push_str("### General Notes\n\n");
        for pair in general {
            out.push_str(&format!("- {}\n", plain(&pair.answer)));
        }
        out.push('\n');
    }
    out.push_str("### Full Transcript\n\n");
    for pair in input.transcript {
        out.push_str(&format!(
            "**Q:** {}\n\n**A:** {}\n\n",
            plain(&pair.question),
            plain(&pair.answer)
        ));
    }

    out
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
