use crate::error::{AppError, Result};
use crate::project::{Feature, Language, ProjectKind, ProjectSpec, SpecParser};

const SKIP_WORDS: &[&str] = &[
    "create", "a", "an", "the", "make", "build", "for", "with", "python", "javascript",
    "typescript", "go", "rust", "node", "cli", "api", "rest", "web", "library", "tool",
    "server", "application", "app", "service", "utility",
];

/// Keyword heuristics over the request text. No language understanding.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSpecParser;

impl SpecParser for KeywordSpecParser {
    fn parse(&self, text: &str) -> Result<ProjectSpec> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Spec("project description is empty".to_string()));
        }

        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(&w.as_str()));

        let language = if has(&["javascript", "node", "nodejs"]) {
            Language::JavaScript
        } else if has(&["typescript"]) {
            Language::TypeScript
        } else if has(&["go", "golang"]) {
            Language::Go
        } else if has(&["rust"]) {
            Language::Rust
        } else {
            Language::Python
        };

        let kind = if has(&["api", "rest", "server"]) {
            ProjectKind::Api
        } else if has(&["web", "frontend"]) {
            ProjectKind::Web
        } else if has(&["library", "lib", "package"]) {
            ProjectKind::Library
        } else {
            ProjectKind::Cli
        };

        let mut features = vec![Feature::Testing];
        if has(&["ci", "github", "actions"]) {
            features.push(Feature::Ci);
        }
        if has(&["docker", "container"]) {
            features.push(Feature::Docker);
        }
        if has(&["docs", "documentation"]) {
            features.push(Feature::Docs);
        }

        let name = explicit_name(text)
            .or_else(|| derived_name(text))
            .map(|n| sanitize_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("my-{kind}"));

        tracing::debug!(%name, %language, %kind, ?features, "Parsed project request");

        Ok(ProjectSpec {
            name,
            description: text.to_string(),
            language,
            kind,
            features,
            dependencies: Vec::new(),
        })
    }
}

/// The word following "called" or "named".
fn explicit_name(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .windows(2)
        .find(|pair| matches!(pair[0].to_lowercase().as_str(), "called" | "named"))
        .map(|pair| {
            pair[1]
                .trim_matches(|c: char| ".,;:\"'-".contains(c))
                .to_string()
        })
        .filter(|n| !n.is_empty())
}

/// Up to two meaningful words joined with a hyphen.
fn derived_name(text: &str) -> Option<String> {
    let meaningful: Vec<String> = text
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && w.chars().all(char::is_alphabetic))
        .filter(|w| !SKIP_WORDS.contains(&w.as_str()))
        .take(2)
        .collect();
    if meaningful.is_empty() {
        None
    } else {
        Some(meaningful.join("-"))
    }
}

/// Lowercase, map everything outside `[a-z0-9]` to `-`, collapse runs.
pub fn sanitize_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
