//! Collaborators the pipeline drives: specification parsing, file
//! scaffolding and environment analysis. Each is a trait so callers can
//! substitute their own; the default implementations are deliberately small.

pub mod analyze;
pub mod scaffold;
pub mod spec;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use analyze::FsAnalyzer;
pub use scaffold::TemplateScaffolder;
pub use spec::KeywordSpecParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Cli,
    Api,
    Web,
    Library,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Cli => "cli",
            ProjectKind::Api => "api",
            ProjectKind::Web => "web",
            ProjectKind::Library => "library",
        }
    }
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Testing,
    Ci,
    Docker,
    Docs,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Testing => "testing",
            Feature::Ci => "ci",
            Feature::Docker => "docker",
            Feature::Docs => "docs",
        }
    }
}

/// What to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Directory-safe name (`[a-z0-9-]+`).
    pub name: String,
    pub description: String,
    pub language: Language,
    pub kind: ProjectKind,
    pub features: Vec<Feature>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ProjectSpec {
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// One file to materialize, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: String,
    pub executable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationVector {
    pub kind: String,
    pub priority: String,
    pub description: String,
}

/// Summary of a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub file_count: usize,
    pub dir_count: usize,
    pub languages: BTreeMap<String, usize>,
    pub frameworks: Vec<String>,
    pub optimization_vectors: Vec<OptimizationVector>,
}

/// Turns a free-text request into a [`ProjectSpec`].
pub trait SpecParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ProjectSpec>;
}

pub trait Scaffolder: Send + Sync {
    fn scaffold(&self, spec: &ProjectSpec) -> Result<Vec<GeneratedFile>>;

    /// Write `files` under `target_dir`, returning the absolute paths written.
    fn write(&self, files: &[GeneratedFile], target_dir: &Path) -> Result<Vec<PathBuf>>;
}

pub trait EnvironmentAnalyzer: Send + Sync {
    fn analyze(&self, dir: &Path) -> Result<EnvironmentReport>;
}
