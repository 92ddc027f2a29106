//! Keyword rule tables for the synthesizer.
//!
//! Both tables are ordered and the first matching rule wins.

use std::fmt;

use serde::Serialize;

/// Requirement topic a transcript question is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Functionality,
    Users,
    Demographics,
    Design,
    Market,
    Technical,
    General,
}

impl Topic {
    pub fn title(&self) -> &'static str {
        match self {
            Topic::Functionality => "Functionality",
            Topic::Users => "Users",
            Topic::Demographics => "Demographics",
            Topic::Design => "Design",
            Topic::Market => "Market",
            Topic::Technical => "Technical",
            Topic::General => "General",
        }
    }

    /// Rendered under functional requirements.
    pub const FUNCTIONAL: [Topic; 2] = [Topic::Functionality, Topic::Users];

    /// Rendered under non-functional requirements.
    pub const NON_FUNCTIONAL: [Topic; 4] =
        [Topic::Demographics, Topic::Design, Topic::Market, Topic::Technical];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// File a question under `topic` when it mentions any of `terms`.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub topic: Topic,
    /// Single words or multi-word phrases, lowercase.
    pub terms: &'static [&'static str],
}

pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        topic: Topic::Functionality,
        terms: &[
            "functionality", "feature", "features", "core feature", "purpose", "problem",
            "capability", "capabilities", "function", "functions", "main goal", "workflow",
        ],
    },
    CategoryRule {
        // Bare "who are" and "target" stay out: market and demographics questions use them
        topic: Topic::Users,
        terms: &[
            "user", "primary users", "user journey", "user types", "end-user", "end-users",
            "end users", "roles", "who will use", "who will", "who is", "persona", "personas",
            "customer", "customers", "client", "clients", "segment", "segments",
        ],
    },
    CategoryRule {
        topic: Topic::Demographics,
        terms: &[
            "age", "ages", "geographic", "region", "regions", "location", "locations", "country",
            "countries", "proficiency", "demographic", "demographics", "audience", "gender",
            "income", "education", "occupation",
        ],
    },
    CategoryRule {
        topic: Topic::Design,
        terms: &[
            "design", "brand", "color", "colors", "colour", "colours", "style", "styling",
            "visual", "desktop", "mood", "ui", "ux", "interface", "aesthetic", "aesthetics",
            "look and feel", "theme", "layout",
        ],
    },
    CategoryRule {
        topic: Topic::Market,
        terms: &[
            "competitor", "competitors", "competition", "value proposition", "business model",
            "monetization", "monetize", "revenue", "pricing", "price", "market", "industry",
            "sector",
        ],
    },
    CategoryRule {
        topic: Topic::Technical,
        terms: &[
            "technical", "technology", "stack", "performance", "scalability", "architecture",
            "framework", "frameworks", "database", "databases", "backend", "frontend",
            "infrastructure", "security", "hosting", "integration", "integrations", "api", "apis",
        ],
    },
];

/// Lowercase words of `text`, keeping inner hyphens.
pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn mentions(padded: &str, term: &str) -> bool {
    padded.contains(&format!(" {} ", term))
}

/// Topic for a question, `General` when nothing matches.
pub fn categorize(question: &str) -> Topic {
    let padded = format!(" {} ", words(question).join(" "));
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.terms.iter().any(|t| mentions(&padded, t)))
        .map(|rule| rule.topic)
        .unwrap_or(Topic::General)
}

/// Functionality answers beyond this count mark a product as complex.
pub const COMPLEXITY_THRESHOLD: usize = 5;

const REALTIME_TERMS: &[&str] = &["realtime", "real-time", "live", "chat"];
const API_TERMS: &[&str] = &["api", "rest", "graphql"];
const MOBILE_TERMS: &[&str] = &["mobile", "ios", "android"];
const WEB_TERMS: &[&str] = &["web", "browser", "website"];

/// Architectural signals found in the answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub realtime: bool,
    pub api: bool,
    pub mobile: bool,
    pub web: bool,
    pub complex: bool,
}

impl Signals {
    pub fn detect<'a>(answers: impl IntoIterator<Item = &'a str>, functionality_answers: usize) -> Self {
        let mut signals = Signals {
            complex: functionality_answers > COMPLEXITY_THRESHOLD,
            ..Default::default()
        };

        for answer in answers {
            for word in words(answer) {
                let word = word.as_str();
                signals.realtime |= REALTIME_TERMS.contains(&word);
                signals.api |= API_TERMS.contains(&word);
                signals.mobile |= MOBILE_TERMS.contains(&word);
                signals.web |= WEB_TERMS.contains(&word);
            }
        }

        signals
    }
}

/// Recommended overall shape of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitecturePattern {
    EventDriven,
    ApiService,
    MobileClient,
    ModularWeb,
    SimpleWeb,
    Layered,
}

/// Fixed recommendation text for a pattern.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureBlock {
    pub name: &'static str,
    pub frontend: &'static str,
    pub backend: &'static str,
    pub data: &'static str,
    pub rationale: &'static str,
    pub default_stack: &'static [&'static str],
    pub folder_layout: &'static str,
}

impl ArchitecturePattern {
    pub fn block(&self) -> ArchitectureBlock {
        match self {
            ArchitecturePattern::EventDriven => ArchitectureBlock {
                name: "Event-driven real-time architecture",
                frontend: "Reactive client subscribed to server events over WebSockets",
                backend: "Async event hub with publish/subscribe channels and stateless workers",
                data: "Primary relational store plus an in-memory broker for fan-out",
                rationale: "Live updates and chat need push delivery and low-latency fan-out.",
                default_stack: &["TypeScript", "React", "Node.js", "WebSockets", "Redis", "PostgreSQL"],
                folder_layout: "src/\n  client/\n  server/\n    events/\n    handlers/\n  shared/\ntests/",
            },
            ArchitecturePattern::ApiService => ArchitectureBlock {
                name: "API-first service",
                frontend: "None; consumers integrate through documented endpoints",
                backend: "Versioned REST or GraphQL API with clear resource boundaries",
                data: "Relational store behind a repository layer",
                rationale: "The product is consumed programmatically, so the contract is the product.",
                default_stack: &["Python", "FastAPI", "PostgreSQL", "OpenAPI"],
                folder_layout: "src/\n  api/\n  domain/\n  repositories/\n  schemas/\ntests/",
            },
            ArchitecturePattern::MobileClient => ArchitectureBlock {
                name: "Mobile client with backend API",
                frontend: "Cross-platform mobile app with offline-friendly local state",
                backend: "Lightweight API serving the mobile client",
                data: "Server-side relational store with on-device cache",
                rationale: "Users reach the product on phones, so the client drives the design.",
                default_stack: &["React Native", "TypeScript", "Node.js", "PostgreSQL"],
                folder_layout: "app/\n  screens/\n  components/\n  services/\nserver/\n  routes/\n  models/\ntests/",
            },
            ArchitecturePattern::ModularWeb => ArchitectureBlock {
                name: "Modular web application",
                frontend: "Component-based SPA split into feature modules",
                backend: "Modular monolith with one module per feature area",
                data: "Relational store with per-module schemas",
                rationale: "Many features on the web benefit from clear module seams without microservice overhead.",
                default_stack: &["TypeScript", "React", "Node.js", "PostgreSQL"],
                folder_layout: "src/\n  modules/\n    <feature>/\n      ui/\n      api/\n      domain/\n  shared/\ntests/",
            },
            ArchitecturePattern::SimpleWeb => ArchitectureBlock {
                name: "Simple web application",
                frontend: "Server-rendered pages or a small SPA",
                backend: "Single web service with a thin controller layer",
                data: "Single relational database",
                rationale: "A focused web product ships fastest with the fewest moving parts.",
                default_stack: &["TypeScript", "Next.js", "PostgreSQL"],
                folder_layout: "src/\n  pages/\n  components/\n  lib/\ntests/",
            },
            ArchitecturePattern::Layered => ArchitectureBlock {
                name: "Layered architecture",
                frontend: "Presentation layer appropriate to the chosen platform",
                backend: "Application, domain and infrastructure layers with inward dependencies",
                data: "Relational store accessed through repositories",
                rationale: "No strong platform signal was given, so a conventional layered design keeps options open.",
                default_stack: &["Python", "PostgreSQL"],
                folder_layout: "src/\n  presentation/\n  application/\n  domain/\n  infrastructure/\ntests/",
            },
        }
    }
}

/// Choose `pattern` when `applies` holds for the signals.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureRule {
    pub pattern: ArchitecturePattern,
    pub applies: fn(&Signals) -> bool,
}

pub const ARCHITECTURE_RULES: &[ArchitectureRule] = &[
    ArchitectureRule {
        pattern: ArchitecturePattern::EventDriven,
        applies: |s: &Signals| s.realtime,
    },
    ArchitectureRule {
        pattern: ArchitecturePattern::ApiService,
        applies: |s: &Signals| s.api && !s.web && !s.mobile,
    },
    ArchitectureRule {
        pattern: ArchitecturePattern::MobileClient,
        applies: |s: &Signals| s.mobile && !s.web,
    },
    ArchitectureRule {
        pattern: ArchitecturePattern::ModularWeb,
        applies: |s: &Signals| s.web && s.complex,
    },
    ArchitectureRule {
        pattern: ArchitecturePattern::SimpleWeb,
        applies: |s: &Signals| s.web,
    },
];

pub fn infer_architecture(signals: &Signals) -> ArchitecturePattern {
    ARCHITECTURE_RULES
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map(|rule| rule.pattern)
        .unwrap_or(ArchitecturePattern::Layered)
}

/// Technologies recognised in technical answers, as (match term, display name).
pub const KNOWN_TECHNOLOGIES: &[(&str, &str)] = &[
    ("rust", "Rust"),
    ("python", "Python"),
    ("django", "Django"),
    ("fastapi", "FastAPI"),
    ("flask", "Flask"),
    ("typescript", "TypeScript"),
    ("javascript", "JavaScript"),
    ("node", "Node.js"),
    ("nodejs", "Node.js"),
    ("react", "React"),
    ("next", "Next.js"),
    ("nextjs", "Next.js"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("svelte", "Svelte"),
    ("flutter", "Flutter"),
    ("swift", "Swift"),
    ("kotlin", "Kotlin"),
    ("java", "Java"),
    ("go", "Go"),
    ("golang", "Go"),
    ("ruby", "Ruby"),
    ("rails", "Ruby on Rails"),
    ("postgres", "PostgreSQL"),
    ("postgresql", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("sqlite", "SQLite"),
    ("mongodb", "MongoDB"),
    ("redis", "Redis"),
    ("firebase", "Firebase"),
    ("supabase", "Supabase"),
    ("graphql", "GraphQL"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("aws", "AWS"),
    ("gcp", "Google Cloud"),
    ("azure", "Azure"),
];

/// Named technologies in first-mention order, without duplicates.
pub fn detect_technologies<'a>(answers: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for answer in answers {
        for word in words(answer) {
            if let Some((_, name)) = KNOWN_TECHNOLOGIES.iter().find(|(term, _)| *term == word.as_str()) {
                if !found.contains(name) {
                    found.push(name);
                }
            }
        }
    }
    found
}
