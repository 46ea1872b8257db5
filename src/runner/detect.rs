use std::fs;
use std::path::Path;

use serde::Serialize;

/// Test frameworks the executor knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkId {
    Pytest,
    Unittest,
    Jest,
    Mocha,
}

impl FrameworkId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkId::Pytest => "pytest",
            FrameworkId::Unittest => "unittest",
            FrameworkId::Jest => "jest",
            FrameworkId::Mocha => "mocha",
        }
    }
}

impl std::fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detection rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionRule {
    ConfigFile,
    BuildManifest,
    TestFileContent,
    PackageManifest,
    LanguageDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub framework: FrameworkId,
    pub rule: DetectionRule,
    pub reason: String,
}

impl Detection {
    fn new(framework: FrameworkId, rule: DetectionRule, reason: impl Into<String>) -> Self {
        Self {
            framework,
            rule,
            reason: reason.into(),
        }
    }
}

/// Primary-language guess used by the last fallback rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Python,
    JavaScript,
}

/// Pick a test framework for `project_dir`.
///
/// Rules are tried in a fixed order and the first hit wins:
/// 1. a dedicated test-config file,
/// 2. a build manifest with a test-tool section,
/// 3. import markers inside `tests/` files,
/// 4. a package manifest naming a JS runner,
/// 5. the usual framework for the primary language when sources or `tests/` exist.
pub fn detect(project_dir: &Path) -> Option<Detection> {
    let detection = detect_config_file(project_dir)
        .or_else(|| detect_build_manifest(project_dir))
        .or_else(|| detect_test_file_content(project_dir))
        .or_else(|| detect_package_manifest(project_dir))
        .or_else(|| detect_language_default(project_dir));

    match &detection {
        Some(d) => tracing::debug!(
            dir = %project_dir.display(),
            framework = %d.framework,
            reason = %d.reason,
            "Detected test framework"
        ),
        None => tracing::debug!(dir = %project_dir.display(), "No test framework detected"),
    }

    detection
}

fn detect_config_file(dir: &Path) -> Option<Detection> {
    if dir.join("pytest.ini").is_file() {
        return Some(Detection::new(
            FrameworkId::Pytest,
            DetectionRule::ConfigFile,
            "pytest.ini present",
        ));
    }
    for name in ["jest.config.js", "jest.config.ts", "jest.config.json"] {
        if dir.join(name).is_file() {
            return Some(Detection::new(
                FrameworkId::Jest,
                DetectionRule::ConfigFile,
                format!("{name} present"),
            ));
        }
    }
    for name in [".mocharc.json", ".mocharc.yml", ".mocharc.js"] {
        if dir.join(name).is_file() {
            return Some(Detection::new(
                FrameworkId::Mocha,
                DetectionRule::ConfigFile,
                format!("{name} present"),
            ));
        }
    }
    None
}

fn detect_build_manifest(dir: &Path) -> Option<Detection> {
    if let Some(pyproject) = read(&dir.join("pyproject.toml")) {
        if pyproject.contains("[tool.pytest") {
            return Some(Detection::new(
                FrameworkId::Pytest,
                DetectionRule::BuildManifest,
                "pyproject.toml has a [tool.pytest] section",
            ));
        }
    }
    if let Some(setup_cfg) = read(&dir.join("setup.cfg")) {
        if setup_cfg.contains("[tool:pytest]") {
            return Some(Detection::new(
                FrameworkId::Pytest,
                DetectionRule::BuildManifest,
                "setup.cfg has a [tool:pytest] section",
            ));
        }
    }
    None
}

fn detect_test_file_content(dir: &Path) -> Option<Detection> {
    let tests_dir = dir.join("tests");
    let mut entries: Vec<_> = fs::read_dir(&tests_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(content) = read(&path) else {
            continue;
        };

        if file_name.starts_with("test_") && file_name.ends_with(".py") {
            if content.contains("import unittest") {
                return Some(Detection::new(
                    FrameworkId::Unittest,
                    DetectionRule::TestFileContent,
                    format!("tests/{file_name} imports unittest"),
                ));
            }
            if content.contains("import pytest") || content.contains("def test_") {
                return Some(Detection::new(
                    FrameworkId::Pytest,
                    DetectionRule::TestFileContent,
                    format!("tests/{file_name} uses pytest-style tests"),
                ));
            }
        } else if file_name.ends_with(".test.js") || file_name.ends_with(".spec.js") {
            if content.contains("require('mocha')")
                || content.contains("require(\"mocha\")")
                || content.contains("from 'mocha'")
            {
                return Some(Detection::new(
                    FrameworkId::Mocha,
                    DetectionRule::TestFileContent,
                    format!("tests/{file_name} imports mocha"),
                ));
            }
            if content.contains("@jest/globals") || content.contains("jest.") {
                return Some(Detection::new(
                    FrameworkId::Jest,
                    DetectionRule::TestFileContent,
                    format!("tests/{file_name} uses jest"),
                ));
            }
        }
    }
    None
}

fn detect_package_manifest(dir: &Path) -> Option<Detection> {
    let package = read(&dir.join("package.json"))?;
    if package.contains("\"jest\"") {
        return Some(Detection::new(
            FrameworkId::Jest,
            DetectionRule::PackageManifest,
            "package.json names jest",
        ));
    }
    if package.contains("\"mocha\"") {
        return Some(Detection::new(
            FrameworkId::Mocha,
            DetectionRule::PackageManifest,
            "package.json names mocha",
        ));
    }
    None
}

fn detect_language_default(dir: &Path) -> Option<Detection> {
    let has_tests_dir = dir.join("tests").is_dir();
    match primary_language(dir) {
        Some(Language::JavaScript) => Some(Detection::new(
            FrameworkId::Jest,
            DetectionRule::LanguageDefault,
            "JavaScript sources found, defaulting to jest",
        )),
        Some(Language::Python) => Some(Detection::new(
            FrameworkId::Pytest,
            DetectionRule::LanguageDefault,
            "Python sources found, defaulting to pytest",
        )),
        None if has_tests_dir => Some(Detection::new(
            FrameworkId::Pytest,
            DetectionRule::LanguageDefault,
            "tests/ directory found, defaulting to pytest",
        )),
        None => None,
    }
}

/// Count source files in the project root and `src/`; ties go to Python.
fn primary_language(dir: &Path) -> Option<Language> {
    let mut python = 0usize;
    let mut javascript = 0usize;

    for scan_dir in [dir.to_path_buf(), dir.join("src")] {
        let Ok(entries) = fs::read_dir(&scan_dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("py") => python += 1,
                Some("js") | Some("mjs") | Some("cjs") | Some("ts") => javascript += 1,
                _ => {}
            }
        }
    }

    if python == 0 && javascript == 0 {
        None
    } else if javascript > python {
        Some(Language::JavaScript)
    } else {
        Some(Language::Python)
    }
}

fn read(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    fs::read_to_string(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_pytest_ini_wins_over_everything() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "pytest.ini", "[pytest]\n");
        write(tmp.path(), "package.json", r#"{"devDependencies": {"jest": "29"}}"#);
        write(tmp.path(), "tests/test_a.py", "import unittest\n");

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Pytest);
        assert_eq!(d.rule, DetectionRule::ConfigFile);
    }

    #[test]
    fn test_pyproject_pytest_section() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "pyproject.toml",
            "[project]\nname = \"x\"\n\n[tool.pytest.ini_options]\ntestpaths = [\"tests\"]\n",
        );
        write(tmp.path(), "tests/test_a.py", "import unittest\n");

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Pytest);
        assert_eq!(d.rule, DetectionRule::BuildManifest);
    }

    #[test]
    fn test_manifest_without_test_section_falls_through_to_test_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "pyproject.toml", "[project]\nname = \"x\"\n");
        write(
            tmp.path(),
            "tests/test_a.py",
            "import unittest\n\nclass T(unittest.TestCase):\n    pass\n",
        );

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Unittest);
        assert_eq!(d.rule, DetectionRule::TestFileContent);
    }

    #[test]
    fn test_plain_test_functions_select_pytest() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "tests/test_a.py", "def test_one():\n    assert True\n");

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Pytest);
        assert_eq!(d.rule, DetectionRule::TestFileContent);
    }

    #[test]
    fn test_package_json_runner() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "package.json", r#"{"devDependencies": {"mocha": "10"}}"#);

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Mocha);
        assert_eq!(d.rule, DetectionRule::PackageManifest);
    }

    #[test]
    fn test_language_default_for_python_sources() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "main.py", "print('hi')\n");

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Pytest);
        assert_eq!(d.rule, DetectionRule::LanguageDefault);
    }

    #[test]
    fn test_language_default_for_javascript_sources() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "index.js", "module.exports = {};\n");
        write(tmp.path(), "src/util.js", "module.exports = {};\n");

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Jest);
    }

    #[test]
    fn test_empty_tests_dir_defaults_to_pytest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("tests")).unwrap();

        let d = detect(tmp.path()).unwrap();
        assert_eq!(d.framework, FrameworkId::Pytest);
    }

    #[test]
    fn test_nothing_detected_in_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "README.md", "# hi\n");
        assert!(detect(tmp.path()).is_none());
    }
}
