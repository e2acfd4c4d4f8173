//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. They walk the
//! production sources of the relay crates and report lines that break a
//! project rule:
//! - No blocking I/O or sleeping on the request path
//! - Logging through `tracing`, never stdout/stderr
//! - Errors propagated, not unwrapped
//!
//! Test modules (everything after the first `#[cfg(test)]` in a file) and
//! comment lines are not scanned.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_ROOTS: &[&str] = &["relay/core/src", "relay/daemon/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File, relative to the workspace root
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Rule that was broken
    pub rule: &'static str,
    /// Trimmed source text
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.file.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// A pattern that must not appear in production code
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Short description used in reports
    pub name: &'static str,
    /// Substrings that trigger the rule
    pub patterns: &'static [&'static str],
    /// Path fragments (relative, `/`-separated) where the rule does not apply
    pub allowed_in: &'static [&'static str],
    /// Line fragments that exempt a matching line
    pub allowed_lines: &'static [&'static str],
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../.."))
}

/// All `.rs` files under the production roots
#[must_use]
pub fn production_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in PRODUCTION_ROOTS {
        let dir = root.join(dir);
        if !dir.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Lines of `content` that belong to production code, with 1-based numbers
///
/// Stops at the first `#[cfg(test)]` and drops comment lines.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| (idx + 1, line))
        .collect()
}

/// Apply `rule` to one file's content
#[must_use]
pub fn check_content(relative: &Path, content: &str, rule: &Rule) -> Vec<Violation> {
    let unix_path = relative.to_string_lossy().replace('\\', "/");
    if rule.allowed_in.iter().any(|allowed| unix_path.contains(allowed)) {
        return Vec::new();
    }

    production_lines(content)
        .into_iter()
        .filter(|(_, line)| {
            let code = line.split("//").next().unwrap_or(line);
            rule.patterns.iter().any(|p| code.contains(p))
                && !rule.allowed_lines.iter().any(|a| line.contains(a))
        })
        .map(|(line, text)| Violation {
            file: relative.to_path_buf(),
            line,
            rule: rule.name,
            text: text.trim().to_string(),
        })
        .collect()
}

/// Apply `rule` to every production file in the workspace
#[must_use]
pub fn scan(rule: &Rule) -> Vec<Violation> {
    let root = workspace_root();
    let mut violations = Vec::new();
    for path in production_files(&root) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let relative = path.strip_prefix(&root).unwrap_or(&path);
        violations.extend(check_content(relative, &content, rule));
    }
    violations
}

/// Panic with a readable report when there are violations
pub fn assert_clean(rule: &Rule, violations: &[Violation], hint: &str) {
    if violations.is_empty() {
        return;
    }
    let report: Vec<String> = violations.iter().map(|v| format!("  {v}")).collect();
    panic!(
        "\n{} violation(s) of \"{}\" in production code:\n{}\n\n{}\n",
        violations.len(),
        rule.name,
        report.join("\n"),
        hint
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRINTING: Rule = Rule {
        name: "stdout printing",
        patterns: &["println!"],
        allowed_in: &["daemon/src/cli"],
        allowed_lines: &[],
    };

    #[test]
    fn test_test_modules_and_comments_are_skipped() {
        let source = "fn a() {}\n// println!(\"doc\")\nfn b() { println!(\"x\"); }\n#[cfg(test)]\nmod tests { fn c() { println!(\"y\"); } }\n";
        let violations = check_content(Path::new("relay/core/src/a.rs"), source, &PRINTING);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 3);
        assert_eq!(violations[0].text, "fn b() { println!(\"x\"); }");
    }

    #[test]
    fn test_allowed_paths_are_skipped() {
        let source = "fn main() { println!(\"usage\"); }\n";
        assert!(check_content(Path::new("relay/daemon/src/cli/mod.rs"), source, &PRINTING).is_empty());
    }

    #[test]
    fn test_workspace_has_sources() {
        assert!(!production_files(&workspace_root()).is_empty());
    }
}
