use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::{AppError, Result};
use crate::project::{EnvironmentAnalyzer, EnvironmentReport, OptimizationVector};

const IGNORE_DIRS: &[&str] = &[
    ".git", "__pycache__", "node_modules", ".venv", "venv", "dist", "build", ".mypy_cache",
    ".pytest_cache", "htmlcov", ".tox", ".eggs", ".cache", ".ruff_cache", "coverage",
    ".hypothesis", "target",
];

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("java", "Java"),
    ("cpp", "C++"),
    ("c", "C"),
    ("go", "Go"),
    ("rs", "Rust"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("cs", "C#"),
    ("swift", "Swift"),
    ("kt", "Kotlin"),
    ("scala", "Scala"),
    ("sh", "Shell"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("sql", "SQL"),
];

const TOOLING_INDICATORS: &[(&str, &[&str])] = &[
    ("package.json", &["Node.js", "npm"]),
    ("requirements.txt", &["Python", "pip"]),
    ("Pipfile", &["Python", "pipenv"]),
    ("pyproject.toml", &["Python", "pyproject"]),
    ("Cargo.toml", &["Rust", "Cargo"]),
    ("go.mod", &["Go", "Go Modules"]),
    ("pom.xml", &["Java", "Maven"]),
    ("build.gradle", &["Java/Kotlin", "Gradle"]),
    ("Gemfile", &["Ruby", "Bundler"]),
    ("composer.json", &["PHP", "Composer"]),
    ("Makefile", &["Make"]),
    ("CMakeLists.txt", &["CMake"]),
    ("Dockerfile", &["Docker"]),
    ("docker-compose.yml", &["Docker Compose"]),
    (".github/workflows", &["GitHub Actions"]),
];

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec"];
const CI_FILES: &[&str] = &[".github/workflows", ".gitlab-ci.yml", ".travis.yml", "Jenkinsfile"];
const PYTHON_MANIFESTS: &[&str] = &["requirements.txt", "Pipfile", "pyproject.toml"];

/// Walks the tree on disk; symlinks are not followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAnalyzer;

impl EnvironmentAnalyzer for FsAnalyzer {
    fn analyze(&self, dir: &Path) -> Result<EnvironmentReport> {
        if !dir.is_dir() {
            return Err(AppError::Collaborator(format!(
                "cannot analyze {}: not a directory",
                dir.display()
            )));
        }

        let mut report = EnvironmentReport::default();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_ignored(e))
            .filter_map(|e| e.ok())
        {
            let file_type = entry.file_type();
            if file_type.is_dir() {
                report.dir_count += 1;
            } else if file_type.is_file() {
                report.file_count += 1;
                if let Some(language) = language_of(entry.path()) {
                    *report.languages.entry(language.to_string()).or_default() += 1;
                }
            }
        }

        for (indicator, tools) in TOOLING_INDICATORS {
            if has_content(&dir.join(indicator)) {
                report.frameworks.extend(tools.iter().map(|t| t.to_string()));
            }
        }

        report.optimization_vectors = optimization_vectors(dir, &report);
        Ok(report)
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORE_DIRS.contains(&name))
}

fn language_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, language)| *language)
}

/// Directories count when present; files only when non-empty.
fn has_content(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_dir() || meta.len() > 0,
        Err(_) => false,
    }
}

fn optimization_vectors(dir: &Path, report: &EnvironmentReport) -> Vec<OptimizationVector> {
    let exists = |name: &&str| dir.join(name).exists();
    let vector = |kind: &str, priority: &str, description: &str| OptimizationVector {
        kind: kind.to_string(),
        priority: priority.to_string(),
        description: description.to_string(),
    };

    let mut vectors = Vec::new();
    if !dir.join("README.md").exists() {
        vectors.push(vector(
            "documentation",
            "high",
            "Missing README.md - should add project documentation",
        ));
    }
    if !TEST_DIRS.iter().any(exists) && report.file_count > 5 {
        vectors.push(vector(
            "testing",
            "high",
            "No test directory found - should implement testing infrastructure",
        ));
    }
    if !CI_FILES.iter().any(exists) && report.file_count > 10 {
        vectors.push(vector(
            "ci_cd",
            "medium",
            "No CI/CD configuration found - should add automated pipelines",
        ));
    }
    if report.languages.contains_key("Python") && !PYTHON_MANIFESTS.iter().any(exists) {
        vectors.push(vector(
            "dependency_management",
            "high",
            "Python project without dependency management - should add requirements.txt or pyproject.toml",
        ));
    }
    vectors
}
