use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::DiffParseError;

const MAX_KEY_CHANGES: usize = 10;

lazy_static! {
    static ref HUNK_HEADER: Regex =
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap();
    static ref KEY_CHANGE: Regex =
        Regex::new(r"\b(def|class|function|fn|struct|enum|interface|trait)\s").unwrap();
}

/// how a file was touched by the diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        }
    }
}

/// categorize files by their purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    SourceCode,
    Test,
    Documentation,
    Config,
    Build,
    Ci,
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::SourceCode => "source",
            FileType::Test => "test",
            FileType::Documentation => "docs",
            FileType::Config => "config",
            FileType::Build => "build",
            FileType::Ci => "ci",
            FileType::Other => "other",
        }
    }
}

/// a single file touched by the diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub old_path: Option<String>,
    pub change_kind: ChangeKind,
    pub file_type: FileType,
    pub additions: usize,
    pub deletions: usize,
}

/// structured facts extracted from a unified diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub files_changed: Vec<FileChange>,
    pub additions: usize,
    pub deletions: usize,
    #[serde(skip)]
    pub raw_diff: String,
    /// added lines that declare functions, types and the like
    pub key_changes: Vec<String>,
    #[serde(skip)]
    pub skipped: Vec<DiffParseError>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.files_changed.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files_changed.iter().map(|f| f.path.as_str()).collect()
    }

    /// one-line "n files changed, x insertions, y deletions" summary
    pub fn stat_line(&self) -> String {
        let file_count = self.files_changed.len();
        format!(
            "{} file{} changed, {} insertion{}, {} deletion{}",
            file_count,
            if file_count == 1 { "" } else { "s" },
            self.additions,
            if self.additions == 1 { "" } else { "s" },
            self.deletions,
            if self.deletions == 1 { "" } else { "s" }
        )
    }
}

struct Section {
    path: String,
    old_path: Option<String>,
    kind: ChangeKind,
    additions: usize,
    deletions: usize,
    seen_hunk: bool,
    start_line: usize,
}

impl Section {
    fn new(start_line: usize) -> Self {
        Self {
            path: String::new(),
            old_path: None,
            kind: ChangeKind::Modified,
            additions: 0,
            deletions: 0,
            seen_hunk: false,
            start_line,
        }
    }
}

/// lines still expected in the current hunk body
struct Hunk {
    old_remaining: usize,
    new_remaining: usize,
}

impl Hunk {
    fn is_done(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }
}

/// parse unified diff text into a change summary
///
/// fragments that cannot be interpreted are recorded in `skipped` and the
/// rest of the diff is still analysed.
pub fn analyze(diff_text: &str) -> ChangeSummary {
    let mut summary = ChangeSummary {
        raw_diff: diff_text.to_string(),
        ..ChangeSummary::default()
    };

    let mut current: Option<Section> = None;
    let mut hunk: Option<Hunk> = None;

    for (idx, line) in diff_text.lines().enumerate() {
        let line_no = idx + 1;

        if let (Some(h), Some(section)) = (hunk.as_mut(), current.as_mut()) {
            if consume_hunk_line(line, h, section, &mut summary.key_changes) {
                if h.is_done() {
                    hunk = None;
                }
                continue;
            }
            // hunk ended early, treat the line as a header
            hunk = None;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_section(current.take(), &mut summary);
            let mut section = Section::new(line_no);
            match parse_git_header(rest) {
                Some((old, new)) => {
                    if old != new {
                        section.old_path = Some(old);
                        section.kind = ChangeKind::Renamed;
                    }
                    section.path = new;
                }
                None => summary.skipped.push(DiffParseError {
                    line: line_no,
                    reason: "unrecognised diff --git header".to_string(),
                }),
            }
            current = Some(section);
        } else if line.starts_with("new file mode") {
            if let Some(section) = current.as_mut() {
                section.kind = ChangeKind::Added;
                section.old_path = None;
            }
        } else if line.starts_with("deleted file mode") {
            if let Some(section) = current.as_mut() {
                section.kind = ChangeKind::Deleted;
                section.old_path = None;
            }
        } else if let Some(from) = line.strip_prefix("rename from ") {
            if let Some(section) = current.as_mut() {
                section.old_path = Some(from.to_string());
                section.kind = ChangeKind::Renamed;
            }
        } else if let Some(to) = line.strip_prefix("rename to ") {
            if let Some(section) = current.as_mut() {
                section.path = to.to_string();
                section.kind = ChangeKind::Renamed;
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            // plain `diff -u` output has no git header, a new `---` opens a section
            let needs_new = current.as_ref().is_none_or(|s| s.seen_hunk);
            if needs_new {
                finish_section(current.take(), &mut summary);
                current = Some(Section::new(line_no));
            }
            if let Some(section) = current.as_mut() {
                let old = header_path(rest, "a/");
                if old == "/dev/null" {
                    section.kind = ChangeKind::Added;
                } else if section.path.is_empty() {
                    section.path = old;
                }
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            match current.as_mut() {
                Some(section) => {
                    let new = header_path(rest, "b/");
                    if new == "/dev/null" {
                        section.kind = ChangeKind::Deleted;
                    } else {
                        section.path = new;
                    }
                }
                None => summary.skipped.push(DiffParseError {
                    line: line_no,
                    reason: "file header without a preceding '---' line".to_string(),
                }),
            }
        } else if line.starts_with("@@") {
            let Some(section) = current.as_mut() else {
                summary.skipped.push(DiffParseError {
                    line: line_no,
                    reason: "hunk header outside a file section".to_string(),
                });
                continue;
            };
            match parse_hunk_header(line) {
                Some(h) => {
                    section.seen_hunk = true;
                    if !h.is_done() {
                        hunk = Some(h);
                    }
                }
                None => summary.skipped.push(DiffParseError {
                    line: line_no,
                    reason: format!("malformed hunk header '{line}'"),
                }),
            }
        } else if line.starts_with('+') || line.starts_with('-') {
            summary.skipped.push(DiffParseError {
                line: line_no,
                reason: "change line outside a hunk".to_string(),
            });
        }
        // everything else (index lines, mode lines, commit headers) carries no counts
    }

    finish_section(current.take(), &mut summary);

    for issue in &summary.skipped {
        debug!(line = issue.line, reason = %issue.reason, "skipped diff fragment");
    }

    summary
}

/// account for one line inside a hunk body, false if the line is not hunk content
fn consume_hunk_line(
    line: &str,
    hunk: &mut Hunk,
    section: &mut Section,
    key_changes: &mut Vec<String>,
) -> bool {
    match line.as_bytes().first() {
        Some(b'+') if hunk.new_remaining > 0 => {
            section.additions += 1;
            hunk.new_remaining -= 1;
            let content = &line[1..];
            if key_changes.len() < MAX_KEY_CHANGES && KEY_CHANGE.is_match(content) {
                key_changes.push(content.trim().to_string());
            }
            true
        }
        Some(b'-') if hunk.old_remaining > 0 => {
            section.deletions += 1;
            hunk.old_remaining -= 1;
            true
        }
        // context lines; some tools strip the trailing space of empty context lines
        Some(b' ') | None => {
            hunk.old_remaining = hunk.old_remaining.saturating_sub(1);
            hunk.new_remaining = hunk.new_remaining.saturating_sub(1);
            true
        }
        Some(b'\\') => true,
        _ => false,
    }
}

fn finish_section(section: Option<Section>, summary: &mut ChangeSummary) {
    let Some(section) = section else {
        return;
    };

    if section.path.is_empty() {
        summary.skipped.push(DiffParseError {
            line: section.start_line,
            reason: "file section without a usable path".to_string(),
        });
        return;
    }

    let old_path = match section.kind {
        ChangeKind::Renamed => section.old_path,
        _ => None,
    };

    summary.additions += section.additions;
    summary.deletions += section.deletions;
    summary.files_changed.push(FileChange {
        file_type: classify_file_type(&section.path),
        path: section.path,
        old_path,
        change_kind: section.kind,
        additions: section.additions,
        deletions: section.deletions,
    });
}

/// split "a/old b/new" into its two paths
fn parse_git_header(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    let after_a = rest.strip_prefix("a/")?;
    let split = after_a.find(" b/")?;
    let old = &after_a[..split];
    let new = &after_a[split + 3..];
    if old.is_empty() || new.is_empty() {
        return None;
    }
    Some((old.to_string(), new.to_string()))
}

/// path from a `---`/`+++` line, without the a/ b/ prefix or a trailing timestamp
fn header_path(rest: &str, prefix: &str) -> String {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path == "/dev/null" {
        return path.to_string();
    }
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let caps = HUNK_HEADER.captures(line)?;
    let count = |idx: usize| -> Option<usize> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(1),
        }
    };
    Some(Hunk {
        old_remaining: count(2)?,
        new_remaining: count(4)?,
    })
}

/// classify file type based on path and extension
pub fn classify_file_type(path: &str) -> FileType {
    let path_lower = path.to_lowercase();
    let file_name = path_lower.rsplit('/').next().unwrap_or(&path_lower);

    if path_lower.starts_with(".github/workflows")
        || path_lower.contains(".gitlab-ci")
        || path_lower.starts_with(".circleci")
        || file_name == "jenkinsfile"
        || file_name == ".travis.yml"
    {
        return FileType::Ci;
    }

    // test files (multi-language)
    if path_lower.contains("test")
        || path_lower.contains("spec")
        || path_lower.contains("__tests__")
        || file_name.ends_with("_test.go")
    {
        return FileType::Test;
    }

    // documentation
    if file_name.ends_with(".md")
        || file_name.ends_with(".rst")
        || file_name.ends_with(".adoc")
        || (file_name.ends_with(".txt") && !file_name.starts_with("requirements"))
        || file_name.contains("readme")
        || path_lower.starts_with("docs/")
    {
        return FileType::Documentation;
    }

    // build files (multi-language)
    if file_name == "package.json"
        || file_name.ends_with(".lock")
        || file_name.ends_with("-lock.json")
        || file_name.ends_with("-lock.yaml")
        || file_name == "cargo.toml"
        || file_name == "makefile"
        || file_name == "dockerfile"
        || file_name.starts_with("requirements")
        || file_name == "setup.py"
        || file_name == "pyproject.toml"
        || file_name.ends_with(".csproj")
        || file_name.ends_with(".gradle")
        || file_name == "pom.xml"
        || file_name == "go.mod"
    {
        return FileType::Build;
    }

    // config files
    if file_name.ends_with(".json")
        || file_name.ends_with(".yaml")
        || file_name.ends_with(".yml")
        || file_name.ends_with(".toml")
        || file_name.ends_with(".ini")
        || file_name.ends_with(".conf")
        || file_name.ends_with(".cfg")
        || file_name.contains(".env")
        || file_name.ends_with(".xml")
    {
        return FileType::Config;
    }

    // source code (multi-language)
    const SOURCE_EXTENSIONS: &[&str] = &[
        "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "cc", "hpp",
        "cs", "rb", "php", "swift", "scala", "vue", "svelte", "css", "scss", "html", "sh", "sql",
    ];
    if let Some(ext) = file_name.rsplit_once('.').map(|(_, ext)| ext) {
        if SOURCE_EXTENSIONS.contains(&ext) {
            return FileType::SourceCode;
        }
    }

    FileType::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MODIFY: &str = "\
diff --git a/src/loop.py b/src/loop.py
index 83db48f..bf269f4 100644
--- a/src/loop.py
+++ b/src/loop.py
@@ -1,4 +1,4 @@
 def walk(items):
-    for i in range(len(items) + 1):
+    for i in range(len(items)):
         yield items[i]

";

    #[test]
    fn empty_diff_is_an_empty_summary() {
        let summary = analyze("");
        assert!(summary.is_empty());
        assert_eq!(summary.additions, 0);
        assert_eq!(summary.deletions, 0);
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn counts_lines_of_a_modified_file() {
        let summary = analyze(MODIFY);
        assert_eq!(summary.files_changed.len(), 1);
        let file = &summary.files_changed[0];
        assert_eq!(file.path, "src/loop.py");
        assert_eq!(file.change_kind, ChangeKind::Modified);
        assert_eq!(file.file_type, FileType::SourceCode);
        assert_eq!((file.additions, file.deletions), (1, 1));
        assert_eq!((summary.additions, summary.deletions), (1, 1));
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn detects_added_deleted_and_renamed_files() {
        let diff = "\
diff --git a/cache.py b/cache.py
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/cache.py
@@ -0,0 +1,2 @@
+class Cache:
+    pass
diff --git a/old.txt b/old.txt
deleted file mode 100644
index e69de29..0000000
--- a/old.txt
+++ /dev/null
@@ -1 +0,0 @@
-gone
diff --git a/lib/a.rs b/lib/b.rs
similarity index 90%
rename from lib/a.rs
rename to lib/b.rs
index 1111111..2222222 100644
--- a/lib/a.rs
+++ b/lib/b.rs
@@ -1,2 +1,2 @@
-fn old() {}
+fn new() {}
 // tail
";
        let summary = analyze(diff);
        let kinds: Vec<_> = summary
            .files_changed
            .iter()
            .map(|f| (f.path.as_str(), f.change_kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("cache.py", ChangeKind::Added),
                ("old.txt", ChangeKind::Deleted),
                ("lib/b.rs", ChangeKind::Renamed),
            ]
        );
        assert_eq!(summary.files_changed[2].old_path.as_deref(), Some("lib/a.rs"));
        assert_eq!((summary.additions, summary.deletions), (3, 2));
        assert_eq!(
            summary.key_changes,
            vec!["class Cache:".to_string(), "fn new() {}".to_string()]
        );
    }

    #[test]
    fn pure_rename_without_hunks() {
        let diff = "\
diff --git a/docs/a.md b/docs/b.md
similarity index 100%
rename from docs/a.md
rename to docs/b.md
";
        let summary = analyze(diff);
        assert_eq!(summary.files_changed.len(), 1);
        assert_eq!(summary.files_changed[0].change_kind, ChangeKind::Renamed);
        assert_eq!(summary.files_changed[0].path, "docs/b.md");
    }

    #[test]
    fn content_that_looks_like_headers_counts_inside_hunks() {
        let diff = "\
diff --git a/notes.md b/notes.md
--- a/notes.md
+++ b/notes.md
@@ -1,2 +1,2 @@
--- old rule
+++ new rule
 keep
";
        let summary = analyze(diff);
        assert_eq!(summary.files_changed.len(), 1);
        assert_eq!((summary.additions, summary.deletions), (1, 1));
    }

    #[test]
    fn plain_unified_diff_without_git_headers() {
        let diff = "\
--- a.c\t2024-01-01 10:00:00
+++ a.c\t2024-01-02 10:00:00
@@ -1 +1,2 @@
 int x;
+int y;
--- b.c
+++ b.c
@@ -1 +1 @@
-int z;
+long z;
";
        let summary = analyze(diff);
        assert_eq!(summary.paths(), vec!["a.c", "b.c"]);
        assert_eq!((summary.additions, summary.deletions), (2, 1));
    }

    #[test]
    fn malformed_fragments_are_skipped() {
        let diff = "\
+stray line before any file
diff --git a/x.rs b/x.rs
--- a/x.rs
+++ b/x.rs
@@ garbage @@
+not counted
@@ -1 +1 @@
-a
+b
";
        let summary = analyze(diff);
        assert_eq!(summary.files_changed.len(), 1);
        assert_eq!((summary.additions, summary.deletions), (1, 1));
        let lines: Vec<usize> = summary.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 5, 6]);
    }

    #[test]
    fn stat_line_pluralises() {
        let summary = analyze(MODIFY);
        assert_eq!(summary.stat_line(), "1 file changed, 1 insertion, 1 deletion");
    }

    #[test]
    fn classifies_common_paths() {
        assert_eq!(classify_file_type("README.md"), FileType::Documentation);
        assert_eq!(classify_file_type("tests/engine.rs"), FileType::Test);
        assert_eq!(classify_file_type("Cargo.toml"), FileType::Build);
        assert_eq!(classify_file_type("config/app.yaml"), FileType::Config);
        assert_eq!(classify_file_type(".github/workflows/ci.yml"), FileType::Ci);
        assert_eq!(classify_file_type("src/main.rs"), FileType::SourceCode);
        assert_eq!(classify_file_type("LICENSE"), FileType::Other);
    }
}
