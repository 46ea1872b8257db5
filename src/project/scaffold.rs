use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::project::{Feature, GeneratedFile, Language, ProjectKind, ProjectSpec, Scaffolder};

const MAIN_CLI: &str = r#"#!/usr/bin/env python3
"""Main entry point for {name}."""

import argparse
import sys


def main():
    parser = argparse.ArgumentParser(description="{description}")
    parser.add_argument("--version", action="version", version="1.0.0")
    parser.parse_args()

    print("{name} is running!")
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

const MAIN_API: &str = r#"#!/usr/bin/env python3
"""API server for {name}."""

import json
from http.server import BaseHTTPRequestHandler, HTTPServer


class APIHandler(BaseHTTPRequestHandler):
    def do_GET(self):
        if self.path == "/health":
            self._send_json({"status": "healthy", "service": "{name}"})
        elif self.path == "/api/v1/status":
            self._send_json({"name": "{name}", "version": "1.0.0", "status": "running"})
        else:
            self._send_json({"error": "Not found"}, 404)

    def _send_json(self, data, status=200):
        self.send_response(status)
        self.send_header("Content-Type", "application/json")
        self.end_headers()
        self.wfile.write(json.dumps(data).encode())


def main():
    server = HTTPServer(("localhost", 8080), APIHandler)
    print("Starting {name} API on http://localhost:8080")
    server.serve_forever()


if __name__ == "__main__":
    main()
"#;

const PACKAGE_INIT: &str = r#""""{name} - {description}"""

__version__ = "1.0.0"
"#;

const LIBRARY_INIT: &str = r#""""{name} - {description}"""

__version__ = "1.0.0"

from .core import {class_name}

__all__ = ["{class_name}"]
"#;

const CORE: &str = r#""""Core functionality for {name}."""


class {class_name}:
    def __init__(self):
        self._initialized = True

    def run(self) -> str:
        return "Success"
"#;

const TESTS_INIT: &str = "\"\"\"Tests for {name}.\"\"\"\n";

const TEST_CORE: &str = r#""""Tests for core functionality."""

import sys
from pathlib import Path

sys.path.insert(0, str(Path(__file__).parent.parent))

from src.core import {class_name}


def test_{name_lower}_initialization():
    instance = {class_name}()
    assert instance._initialized is True


def test_{name_lower}_run():
    instance = {class_name}()
    assert instance.run() == "Success"


if __name__ == "__main__":
    test_{name_lower}_initialization()
    test_{name_lower}_run()
    print("All tests passed!")
"#;

const PYPROJECT: &str = r#"[build-system]
requires = ["setuptools>=61.0"]
build-backend = "setuptools.build_meta"

[project]
name = "{name}"
version = "1.0.0"
description = "{description}"
readme = "README.md"
requires-python = ">=3.8"
dependencies = [{dependencies}]

[project.optional-dependencies]
dev = ["pytest>=7.0.0"]

[project.scripts]
{name} = "main:main"

[tool.pytest.ini_options]
testpaths = ["tests"]
python_files = "test_*.py"
"#;

const README: &str = r#"# {name}

{description}

## Usage

```python
from src.core import {class_name}

print({class_name}().run())
```

## Development

```bash
pip install -e ".[dev]"
pytest
```
"#;

const GITIGNORE: &str = r#"__pycache__/
*.py[cod]
build/
dist/
*.egg-info/
.venv/
.pytest_cache/
.coverage
.env
"#;

const MAKEFILE: &str = "\
.PHONY: install test clean

install:
\tpip install -e \".[dev]\"

test:
\tpytest -v

clean:
\trm -rf build/ dist/ *.egg-info/ .pytest_cache/
";

const CI_WORKFLOW: &str = r#"name: CI

on:
  push:
    branches: [main]
  pull_request:
    branches: [main]

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-python@v5
        with:
          python-version: "3.12"
      - run: pip install -e ".[dev]"
      - run: pytest -v
"#;

const DOCKERFILE: &str = r#"FROM python:3.11-slim

WORKDIR /app
COPY pyproject.toml README.md main.py ./
COPY src/ ./src/
RUN pip install --no-cache-dir .

CMD ["python", "main.py"]
"#;

const COMPOSE: &str = r#"services:
  {name}:
    build: .
    container_name: {name}
    ports:
      - "8080:8080"
    restart: unless-stopped
"#;

/// Static templates for Python projects.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateScaffolder;

impl TemplateScaffolder {
    fn python_files(&self, spec: &ProjectSpec) -> Vec<(&'static str, &'static str)> {
        let main = match spec.kind {
            ProjectKind::Api => MAIN_API,
            _ => MAIN_CLI,
        };
        let init = match spec.kind {
            ProjectKind::Library => LIBRARY_INIT,
            _ => PACKAGE_INIT,
        };

        let mut files = vec![
            ("main.py", main),
            ("src/__init__.py", init),
            ("src/core.py", CORE),
            ("tests/__init__.py", TESTS_INIT),
            ("tests/test_core.py", TEST_CORE),
            ("pyproject.toml", PYPROJECT),
            ("README.md", README),
            (".gitignore", GITIGNORE),
            ("Makefile", MAKEFILE),
        ];
        if spec.has_feature(Feature::Ci) {
            files.push((".github/workflows/ci.yml", CI_WORKFLOW));
        }
        if spec.has_feature(Feature::Docker) {
            files.push(("Dockerfile", DOCKERFILE));
            files.push(("docker-compose.yml", COMPOSE));
        }
        files
    }
}

impl Scaffolder for TemplateScaffolder {
    fn scaffold(&self, spec: &ProjectSpec) -> Result<Vec<GeneratedFile>> {
        if spec.language != Language::Python {
            return Err(AppError::Scaffold(format!(
                "no templates for language '{}'",
                spec.language
            )));
        }

        let vars = TemplateVars::from_spec(spec);
        let files = self
            .python_files(spec)
            .into_iter()
            .map(|(path, template)| {
                let content = vars.render(template);
                GeneratedFile {
                    path: PathBuf::from(path),
                    executable: path.ends_with(".py") && content.starts_with("#!"),
                    content,
                }
            })
            .collect();
        Ok(files)
    }

    fn write(&self, files: &[GeneratedFile], target_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            if file.path.is_absolute()
                || file
                    .path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(AppError::Scaffold(format!(
                    "refusing to write outside the project: {}",
                    file.path.display()
                )));
            }

            let full_path = target_dir.join(&file.path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full_path, &file.content)?;
            if file.executable {
                set_executable(&full_path)?;
            }
            written.push(full_path);
        }
        Ok(written)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

struct TemplateVars {
    name: String,
    name_lower: String,
    class_name: String,
    description: String,
    dependencies: String,
}

impl TemplateVars {
    fn from_spec(spec: &ProjectSpec) -> Self {
        let name_lower = spec.name.to_lowercase().replace(['-', ' '], "_");
        let mut class_name: String = spec
            .name
            .split(['-', '_', ' '])
            .filter(|w| !w.is_empty())
            .map(capitalize)
            .collect();
        if !class_name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            class_name.insert_str(0, "Project");
        }

        Self {
            name: spec.name.clone(),
            name_lower,
            class_name,
            description: spec.description.replace('"', "'").replace(['\n', '\r'], " "),
            dependencies: spec
                .dependencies
                .iter()
                .map(|d| format!("\"{d}\""))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn render(&self, template: &str) -> String {
        template
            .replace("{name_lower}", &self.name_lower)
            .replace("{class_name}", &self.class_name)
            .replace("{description}", &self.description)
            .replace("{dependencies}", &self.dependencies)
            .replace("{name}", &self.name)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
