//! Architectural Enforcement
//!
//! Source scanners shared by the enforcement tests in `tests/`. They walk the
//! production sources of the conductor crates and report lines that use a
//! forbidden pattern outside test code.
//!
//! Every wait in the conductor has to go through the async runtime: a
//! blocked worker thread stalls interrupt watching and lease release for
//! every robot on that thread.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["conductor/core/src", "conductor/daemon/src"];

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// One forbidden use found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the use was found in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Forbidden pattern that matched
    pub pattern: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.pattern,
            self.text
        )
    }
}

/// Scan one file's contents for forbidden patterns
///
/// Everything from the first `#[cfg(test)]` on is test code and skipped,
/// as are line comments.
#[must_use]
pub fn scan_source(path: &Path, content: &str, patterns: &[&'static str]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        let code_part = line.split("//").next().unwrap_or(line);

        for pattern in patterns {
            if code_part.contains(pattern) {
                violations.push(Violation {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    pattern,
                    text: trimmed.to_string(),
                });
            }
        }
    }

    violations
}

/// Scan every production source file for forbidden patterns
#[must_use]
pub fn scan_production(patterns: &[&'static str]) -> Vec<Violation> {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "production directory {} is missing", path.display());

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            violations.extend(scan_source(entry.path(), &content, patterns));
        }
    }

    violations
}

/// Panic with a readable report if any violation was found
pub fn assert_clean(violations: &[Violation], rule: &str) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) of \"{rule}\" in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_skips_comments_and_tests() {
        let source = "\
fn wait() {
    // std::thread::sleep is not allowed here
    std::thread::sleep(d);
}

#[cfg(test)]
mod tests {
    fn helper() { std::thread::sleep(d); }
}
";
        let violations = scan_source(Path::new("x.rs"), source, &["std::thread::sleep"]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 3);
    }
}
