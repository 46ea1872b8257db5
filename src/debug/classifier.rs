use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use regex::Regex;

use crate::config::DebugConfig;
use crate::debug::diagnosis::{Diagnosis, DiagnosisSource};
use crate::error::AppError;
use crate::runner::outcome::{truncate_chars, TestOutcome};
use crate::suggest::{ErrorContext, SuggestionGenerator};

const CONTEXT_OUTPUT_CHARS: usize = 2000;
const CONTEXT_ERROR_CHARS: usize = 1000;
const CONTEXT_MAX_FILES: usize = 3;
const CONTEXT_RADIUS: usize = 5;
const MIN_SUGGESTION_CHARS: usize = 10;

/// One row of the well-known error table.
struct ErrorCategory {
    name: &'static str,
    pattern: &'static str,
    fix: &'static str,
}

const ERROR_CATEGORIES: &[ErrorCategory] = &[
    ErrorCategory {
        name: "ImportError",
        pattern: r"(?:ImportError|ModuleNotFoundError): No module named '([\w.]+)'",
        fix: "Add missing import or install package",
    },
    ErrorCategory {
        name: "AttributeError",
        pattern: r"AttributeError: '(\w+)' object has no attribute '(\w+)'",
        fix: "Check attribute name or add missing method/property",
    },
    ErrorCategory {
        name: "TypeError",
        pattern: r"TypeError: ([\w.]+)\(\) takes (\d+) positional arguments? but (\d+) (?:were|was) given",
        fix: "Adjust function arguments",
    },
    ErrorCategory {
        name: "AssertionError",
        pattern: r"AssertionError",
        fix: "Review assertion logic or expected values",
    },
    ErrorCategory {
        name: "SyntaxError",
        pattern: r"SyntaxError: (.+)",
        fix: "Fix syntax error in code",
    },
    ErrorCategory {
        name: "IndentationError",
        pattern: r"IndentationError: (.+)",
        fix: "Fix indentation",
    },
    ErrorCategory {
        name: "NameError",
        pattern: r"NameError: name '(\w+)' is not defined",
        fix: "Define the variable or fix typo",
    },
];

fn compiled_categories() -> &'static [(Regex, &'static ErrorCategory)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static ErrorCategory)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        ERROR_CATEGORIES
            .iter()
            .map(|c| (Regex::new(c.pattern).expect("static regex is valid"), c))
            .collect()
    })
}

/// `File "path", line N` (Python traceback) and `path.py:N:` (pytest short form).
fn frame_regexes() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("static regex is valid"),
            Regex::new(r"(?m)^([\w./\\-]+\.py):(\d+):").expect("static regex is valid"),
        ]
    })
}

fn suggestion_regexes() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?mi)^\s*File:\s*`?([^`\r\n]+?)`?\s*$").expect("static regex is valid"),
            Regex::new(r"(?s)```old[ \t]*\r?\n(.*?)```").expect("static regex is valid"),
            Regex::new(r"(?s)```new[ \t]*\r?\n(.*?)```").expect("static regex is valid"),
        ]
    })
}

/// A source location mentioned in a traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub path: String,
    pub line: u32,
}

/// Every traceback frame in `text`, in order of appearance.
pub fn extract_frames(text: &str) -> Vec<Frame> {
    let mut frames: Vec<(usize, Frame)> = frame_regexes()
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line = caps[2].parse().ok()?;
            Some((
                whole.start(),
                Frame {
                    path: caps[1].to_string(),
                    line,
                },
            ))
        })
        .collect();
    frames.sort_by_key(|(pos, _)| *pos);
    frames.into_iter().map(|(_, f)| f).collect()
}

/// Maps failing outcomes to candidate diagnoses.
///
/// Pattern matches are informational only. An optional suggestion generator
/// may contribute substitution-bearing diagnoses.
#[derive(Clone)]
pub struct FailureClassifier {
    pattern_confidence: f64,
    suggestion_confidence: f64,
    generator: Option<Arc<dyn SuggestionGenerator>>,
}

impl FailureClassifier {
    pub fn new(config: &DebugConfig) -> Self {
        Self {
            pattern_confidence: config.pattern_confidence,
            suggestion_confidence: config.suggestion_confidence,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn SuggestionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// All diagnoses for `outcome`. Order is not significant.
    pub async fn classify(&self, outcome: &TestOutcome, project_dir: &Path) -> Vec<Diagnosis> {
        let error_text = outcome.error_text();
        let transcript = format!("{}\n{}", outcome.stderr, outcome.stdout);
        let mut diagnoses = self.classify_patterns(&transcript);

        if let Some(generator) = &self.generator {
            let context = build_error_context(outcome, project_dir);
            let call = AssertUnwindSafe(generator.analyze_error(error_text, &context)).catch_unwind();
            let result = match call.await {
                Ok(result) => result,
                Err(payload) => Err(AppError::from_panic("Suggestion generator", payload.as_ref())),
            };
            match result {
                Ok(text) => {
                    if let Some(d) = parse_suggestion(&text, project_dir, self.suggestion_confidence) {
                        tracing::debug!(
                            file = %d.file_path.display(),
                            substitution = d.has_substitution(),
                            "Suggestion generator produced a diagnosis"
                        );
                        diagnoses.push(d);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Suggestion generator failed");
                }
            }
        }

        diagnoses
    }

    /// One informational diagnosis per matching error category.
    pub fn classify_patterns(&self, error_text: &str) -> Vec<Diagnosis> {
        let location = extract_frames(error_text).pop();

        compiled_categories()
            .iter()
            .filter_map(|(re, category)| {
                let caps = re.captures(error_text)?;
                let explanation = match caps.get(1) {
                    Some(detail) => format!("{} ({}): {}", category.name, detail.as_str().trim(), category.fix),
                    None => format!("{}: {}", category.name, category.fix),
                };
                let diagnosis =
                    Diagnosis::informational(DiagnosisSource::Pattern, explanation, self.pattern_confidence);
                Some(match &location {
                    Some(frame) => diagnosis.at(&frame.path, Some(frame.line)),
                    None => diagnosis,
                })
            })
            .collect()
    }
}

/// Output excerpts plus source around the first few traceback frames inside `project_dir`.
pub fn build_error_context(outcome: &TestOutcome, project_dir: &Path) -> ErrorContext {
    let mut context = ErrorContext {
        test_output: truncate_chars(&outcome.stdout, CONTEXT_OUTPUT_CHARS),
        error: truncate_chars(&outcome.stderr, CONTEXT_ERROR_CHARS),
        ..ErrorContext::default()
    };

    for frame in extract_frames(outcome.error_text()) {
        if context.relevant_code.len() >= CONTEXT_MAX_FILES {
            break;
        }
        if context.relevant_code.contains_key(&frame.path) {
            continue;
        }
        let Some(path) = resolve_in_project(project_dir, &frame.path) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        context
            .relevant_code
            .insert(frame.path.clone(), excerpt(&content, frame.line as usize));
    }

    context
}

fn excerpt(content: &str, line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let idx = line.saturating_sub(1);
    let start = idx.saturating_sub(CONTEXT_RADIUS);
    let end = (idx + CONTEXT_RADIUS).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

/// Resolve `raw` against `project_dir`; `None` if it is missing or escapes the project.
fn resolve_in_project(project_dir: &Path, raw: &str) -> Option<PathBuf> {
    let candidate = Path::new(raw);
    let full = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        project_dir.join(candidate)
    };
    let canonical = full.canonicalize().ok()?;
    let root = project_dir.canonicalize().ok()?;
    if canonical.starts_with(&root) && canonical.is_file() {
        Some(canonical)
    } else {
        None
    }
}

/// Turn generator text into a diagnosis.
///
/// Text with a `File:` line plus fenced `old`/`new` blocks yields a substitution;
/// any other non-trivial text yields an informational diagnosis.
pub fn parse_suggestion(text: &str, project_dir: &Path, confidence: f64) -> Option<Diagnosis> {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MIN_SUGGESTION_CHARS {
        return None;
    }

    let [file_re, old_re, new_re] = suggestion_regexes();
    let file = file_re.captures(trimmed).map(|c| c[1].trim().to_string());
    let old = old_re.captures(trimmed).map(|c| strip_block(&c[1]));
    let new = new_re.captures(trimmed).map(|c| strip_block(&c[1]));

    match (file, old, new) {
        (Some(file), Some(old), Some(new)) if !file.is_empty() && !old.is_empty() => {
            let path = if Path::new(&file).is_absolute() {
                PathBuf::from(&file)
            } else {
                project_dir.join(&file)
            };
            let explanation = trailing_explanation(trimmed)
                .unwrap_or_else(|| "AI-suggested fix".to_string());
            Some(Diagnosis::substitution(
                DiagnosisSource::Suggestion,
                path,
                old,
                new,
                explanation,
                confidence,
            ))
        }
        _ => {
            let mut diagnosis =
                Diagnosis::informational(DiagnosisSource::Suggestion, "AI-suggested fix", confidence);
            diagnosis.new_text = trimmed.to_string();
            Some(diagnosis)
        }
    }
}

fn strip_block(block: &str) -> String {
    block
        .strip_suffix("\r\n")
        .or_else(|| block.strip_suffix('\n'))
        .unwrap_or(block)
        .to_string()
}

fn trailing_explanation(text: &str) -> Option<String> {
    let (_, tail) = text.rsplit_once("```")?;
    let tail = tail.trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::runner::outcome::TestStatus;
    use async_trait::async_trait;

    fn classifier() -> FailureClassifier {
        FailureClassifier::new(&DebugConfig::default())
    }

    struct CannedGenerator(std::result::Result<String, String>);

    #[async_trait]
    impl SuggestionGenerator for CannedGenerator {
        async fn analyze_error(&self, _error_text: &str, _context: &ErrorContext) -> Result<String> {
            self.0.clone().map_err(AppError::Suggestion)
        }
    }

    #[test]
    fn test_name_error_is_classified_with_location() {
        let text = "Traceback (most recent call last):\n  File \"/p/tests/test_core.py\", line 3, in <module>\n    print(foo)\nNameError: name 'foo' is not defined\n";
        let diagnoses = classifier().classify_patterns(text);
        assert_eq!(diagnoses.len(), 1);
        let d = &diagnoses[0];
        assert!(d.explanation.starts_with("NameError (foo)"));
        assert_eq!(d.confidence, 0.5);
        assert_eq!(d.file_path, PathBuf::from("/p/tests/test_core.py"));
        assert_eq!(d.line, Some(3));
        assert!(d.old_text.is_empty());
        assert!(d.new_text.is_empty());
        assert!(!d.has_substitution());
    }

    #[test]
    fn test_multiple_categories_can_match() {
        let text = "E   AssertionError\nModuleNotFoundError: No module named 'requests'\n";
        let names: Vec<String> = classifier()
            .classify_patterns(text)
            .into_iter()
            .map(|d| d.explanation)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.starts_with("ImportError (requests)")));
        assert!(names.iter().any(|n| n.starts_with("AssertionError")));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let text = "TypeError: add() takes 2 positional arguments but 3 were given";
        let diagnoses = classifier().classify_patterns(text);
        assert_eq!(diagnoses.len(), 1);
        assert!(diagnoses[0].explanation.contains("Adjust function arguments"));
    }

    #[test]
    fn test_unknown_error_yields_nothing() {
        assert!(classifier().classify_patterns("Segmentation fault").is_empty());
    }

    #[test]
    fn test_extract_frames_orders_both_formats() {
        let text = "tests/test_a.py:12: in test_x\nFile \"src/core.py\", line 4, in run\n";
        let frames = extract_frames(text);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].path, "tests/test_a.py");
        assert_eq!(frames[1], Frame { path: "src/core.py".to_string(), line: 4 });
    }

    #[test]
    fn test_parse_suggestion_with_substitution() {
        let text = "File: src/core.py\n```old\nreturn \"Sucess\"\n```\n```new\nreturn \"Success\"\n```\nFix the typo in the return value.";
        let project = Path::new("/proj");
        let d = parse_suggestion(text, project, 0.6).unwrap();
        assert!(d.has_substitution());
        assert_eq!(d.file_path, PathBuf::from("/proj/src/core.py"));
        assert_eq!(d.old_text, "return \"Sucess\"");
        assert_eq!(d.new_text, "return \"Success\"");
        assert_eq!(d.explanation, "Fix the typo in the return value.");
        assert_eq!(d.confidence, 0.6);
        assert_eq!(d.source, DiagnosisSource::Suggestion);
    }

    #[test]
    fn test_parse_suggestion_free_text_is_informational() {
        let d = parse_suggestion("Install the requests package with pip.", Path::new("/p"), 0.6).unwrap();
        assert!(!d.has_substitution());
        assert_eq!(d.explanation, "AI-suggested fix");
        assert!(d.new_text.contains("requests"));
    }

    #[test]
    fn test_parse_suggestion_ignores_trivial_text() {
        assert!(parse_suggestion("  ok  ", Path::new("/p"), 0.6).is_none());
    }

    #[test]
    fn test_context_excerpt_stays_inside_project() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("core.py");
        let body: String = (1..=20).map(|i| format!("line{i}\n")).collect();
        std::fs::write(&src, body).unwrap();

        let stderr = format!(
            "File \"{}\", line 10, in f\nFile \"/etc/passwd\", line 1, in g\n",
            src.display()
        );
        let outcome = TestOutcome::new("direct", TestStatus::Failed).with_stderr(stderr);
        let context = build_error_context(&outcome, tmp.path());

        assert_eq!(context.relevant_code.len(), 1);
        let excerpt = context.relevant_code.values().next().unwrap();
        assert!(excerpt.starts_with("line5"));
        assert!(excerpt.ends_with("line14"));
    }

    #[tokio::test]
    async fn test_classify_merges_generator_output() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = CannedGenerator(Ok(
            "File: a.py\n```old\nx = 1\n```\n```new\nx = 2\n```\n".to_string(),
        ));
        let classifier = classifier().with_generator(Arc::new(generator));
        let outcome = TestOutcome::new("pytest", TestStatus::Failed).with_stdout("E   AssertionError");

        let diagnoses = classifier.classify(&outcome, tmp.path()).await;
        assert_eq!(diagnoses.len(), 2);
        assert!(diagnoses.iter().any(|d| d.source == DiagnosisSource::Suggestion && d.has_substitution()));
    }

    #[tokio::test]
    async fn test_classify_tolerates_generator_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let classifier = classifier().with_generator(Arc::new(CannedGenerator(Err("down".to_string()))));
        let outcome = TestOutcome::new("pytest", TestStatus::Failed).with_stdout("E   AssertionError");

        let diagnoses = classifier.classify(&outcome, tmp.path()).await;
        assert_eq!(diagnoses.len(), 1);
        assert_eq!(diagnoses[0].source, DiagnosisSource::Pattern);
    }

    struct PanickingGenerator;

    #[async_trait]
    impl SuggestionGenerator for PanickingGenerator {
        async fn analyze_error(&self, _error_text: &str, _context: &ErrorContext) -> Result<String> {
            panic!("generator exploded");
        }
    }

    #[tokio::test]
    async fn test_classify_contains_generator_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let classifier = classifier().with_generator(Arc::new(PanickingGenerator));
        let outcome = TestOutcome::new("pytest", TestStatus::Failed).with_stdout("E   AssertionError");

        let diagnoses = classifier.classify(&outcome, tmp.path()).await;
        assert_eq!(diagnoses.len(), 1);
        assert_eq!(diagnoses[0].source, DiagnosisSource::Pattern);
    }
}
