//! Question strategy selection.
//!
//! Category questions come from per-category templates, lightly adapted to
//! what the user has already said. Follow-ups for thin answers are generated
//! by the completion provider.

use std::collections::HashMap;
use std::sync::Arc;

use specforge_llm::{retry_with_backoff, CompletionProvider, RetryPolicy};
use specforge_models::{Category, Message, Question, Role};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Retrieved chunks shown to the model when generating a question.
const PROMPT_CONTEXT_CHUNKS: usize = 3;

/// Recent messages shown to the model (four exchanges).
const PROMPT_HISTORY_MESSAGES: usize = 8;

/// Noun in templates that adaptation rules replace.
const ADAPTABLE_NOUN: &str = "product";

/// Swap the generic noun when any keyword appears in the context.
#[derive(Debug, Clone, Copy)]
pub struct AdaptationRule {
    pub keywords: &'static [&'static str],
    pub replacement: &'static str,
}

/// Ordered; the first rule with a matching keyword wins.
pub const ADAPTATION_RULES: &[AdaptationRule] = &[
    AdaptationRule {
        keywords: &["mobile", "app"],
        replacement: "mobile app",
    },
    AdaptationRule {
        keywords: &["web", "website"],
        replacement: "web application",
    },
    AdaptationRule {
        keywords: &["api"],
        replacement: "API",
    },
];

const FOLLOWUP_SYSTEM_PROMPT: &str = "You are an expert product investigator conducting a discovery interview.
Your goal is to deeply understand the user's product idea through thoughtful questions.

Generate exactly one concise follow-up question that digs deeper into their latest answer \
and clarifies vague or incomplete information. Be specific and friendly.

Keep the question under 20 words. Do not include any preamble or explanation.";

/// Ordered question templates per category.
#[derive(Debug, Clone)]
pub struct QuestionTemplates {
    templates: HashMap<Category, Vec<String>>,
}

impl Default for QuestionTemplates {
    fn default() -> Self {
        let builtin: [(Category, &[&str]); 7] = [
            (
                Category::Functionality,
                &[
                    "Let's start by understanding what your product does. Can you describe the main functionality or purpose of your product idea?",
                    "What specific problem does your product solve for users?",
                    "What are the key features users will interact with?",
                ],
            ),
            (
                Category::Users,
                &[
                    "Who are the primary users of your product?",
                    "What is the typical user journey through your product?",
                    "What roles or user types exist in your product?",
                ],
            ),
            (
                Category::Demographics,
                &[
                    "What is the age range of your target audience?",
                    "What geographic regions are you targeting?",
                    "What is the technical proficiency level of your users?",
                ],
            ),
            (
                Category::Design,
                &[
                    "Do you have specific design preferences (modern, minimal, bold, colorful)?",
                    "Are there any brand colors or style guidelines to follow?",
                    "Should the product work on desktop, mobile, or both?",
                ],
            ),
            (
                Category::Market,
                &[
                    "Who are your main competitors in this space?",
                    "What is your unique value proposition compared to competitors?",
                    "What is your business model or monetization strategy?",
                ],
            ),
            (
                Category::Technical,
                &[
                    "Do you have any technical stack preferences or requirements?",
                    "What are your performance and scalability requirements?",
                    "Do you need any specific integrations with other services?",
                ],
            ),
            (
                Category::Review,
                &[
                    "Is there anything else important about your product that we haven't covered?",
                    "Would you like to add or clarify any information from our conversation?",
                ],
            ),
        ];

        Self {
            templates: builtin
                .into_iter()
                .map(|(category, texts)| {
                    (category, texts.iter().map(|t| t.to_string()).collect())
                })
                .collect(),
        }
    }
}

impl QuestionTemplates {
    /// No templates at all; every category question goes to the model.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn with(mut self, category: Category, templates: Vec<String>) -> Self {
        self.templates.insert(category, templates);
        self
    }

    pub fn first(&self, category: Category) -> Option<&str> {
        self.templates
            .get(&category)
            .and_then(|t| t.first())
            .map(String::as_str)
    }
}

/// Pick the replacement noun for a context, if any rule matches.
pub fn adaptation_for(context: &[String]) -> Option<&'static str> {
    let combined = context.join(" ").to_lowercase();
    let words: Vec<&str> = combined
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    ADAPTATION_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| words.contains(k)))
        .map(|rule| rule.replacement)
}

/// Apply the first matching adaptation rule to a template.
pub fn adapt_template(template: &str, context: &[String]) -> String {
    match adaptation_for(context) {
        Some(replacement) => template.replace(ADAPTABLE_NOUN, replacement),
        None => template.to_string(),
    }
}

/// Strip wrapping quotes and make sure the text reads as a question.
pub fn finish_question(raw: &str) -> String {
    let text = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if text.ends_with('?') {
        text.to_string()
    } else {
        format!("{}?", text)
    }
}

/// Chooses and produces the next question.
#[derive(Clone)]
pub struct QuestionSelector {
    provider: Arc<dyn CompletionProvider>,
    templates: Arc<QuestionTemplates>,
    retry: RetryPolicy,
    temperature: f32,
}

impl QuestionSelector {
    pub fn new(provider: Arc<dyn CompletionProvider>, retry: RetryPolicy, temperature: f32) -> Self {
        Self {
            provider,
            templates: Arc::new(QuestionTemplates::default()),
            retry,
            temperature,
        }
    }

    pub fn with_templates(mut self, templates: QuestionTemplates) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    /// Opening question for a new session.
    pub async fn initial_question(&self) -> Result<Question> {
        self.category_question(Category::Functionality, &[], &[]).await
    }

    /// Question introducing `category`.
    pub async fn category_question(
        &self,
        category: Category,
        context: &[String],
        recent: &[Message],
    ) -> Result<Question> {
        if let Some(template) = self.templates.first(category) {
            let text = adapt_template(template, context);
            debug!(category = %category, adapted = text != template, "Using template question");
            return Ok(Question::category(category, text));
        }

        info!(category = %category, "No template for category, generating question");

        let system_prompt = format!(
            "You are an expert product investigator conducting a discovery interview.
The interview is now moving to the topic: {}.

Generate exactly one friendly opening question about this topic, tailored to what the user \
has already shared. Keep the question under 20 words. Do not include any preamble or explanation.",
            category
        );
        let user_prompt = build_user_prompt(category, recent, context, None);
        let text = self.complete(&system_prompt, &user_prompt).await?;

        Ok(Question::category(category, text))
    }

    /// Clarifying question about a thin answer, staying in `category`.
    pub async fn followup_question(
        &self,
        category: Category,
        latest_answer: &str,
        context: &[String],
        recent: &[Message],
    ) -> Result<Question> {
        let user_prompt = build_user_prompt(category, recent, context, Some(latest_answer));
        let text = self.complete(FOLLOWUP_SYSTEM_PROMPT, &user_prompt).await?;

        debug!(category = %category, "Generated follow-up question");

        Ok(Question::followup(category, text))
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let raw = retry_with_backoff(self.retry, || {
            self.provider
                .complete(system_prompt, user_prompt, self.temperature)
        })
        .await?;

        if raw.trim().is_empty() {
            return Err(Error::Provider("Provider returned an empty question".to_string()));
        }

        Ok(finish_question(&raw))
    }
}

fn build_user_prompt(
    category: Category,
    recent: &[Message],
    context: &[String],
    latest_answer: Option<&str>,
) -> String {
    let mut prompt = format!("Current investigation category: {}\n", category);

    let start = recent.len().saturating_sub(PROMPT_HISTORY_MESSAGES);
    let history: Vec<String> = recent[start..]
        .iter()
        .map(|m| {
            let tag = match m.role {
                Role::Assistant => "Q",
                Role::User => "A",
            };
            format!("{}: {}", tag, m.content)
        })
        .collect();
    if !history.is_empty() {
        prompt.push_str(&format!("\nRecent conversation:\n{}\n", history.join("\n")));
    }

    if let Some(answer) = latest_answer {
        prompt.push_str(&format!(
            "\nUser's latest answer (needs clarification): {}\n",
            answer
        ));
    }

    let start = context.len().saturating_sub(PROMPT_CONTEXT_CHUNKS);
    if !context[start..].is_empty() {
        prompt.push_str(&format!("\nPrevious context:\n{}\n", context[start..].join("\n\n")));
    }

    prompt.push_str(match latest_answer {
        Some(_) => "\nGenerate a follow-up question to better understand their product.",
        None => "\nGenerate the opening question for this topic.",
    });

    prompt
}
