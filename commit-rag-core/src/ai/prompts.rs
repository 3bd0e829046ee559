// prompt construction module - builds the grounded prompt for the model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::StyleConfig;
use crate::diff::{ChangeKind, ChangeSummary, FileType};
use crate::retrieval::RetrievalResult;
use crate::utils::{identify_scope, truncate_with_ellipsis};

/// diff preview sent to the model is cut at this many characters
const MAX_DIFF_PREVIEW_CHARS: usize = 2000;
const MAX_DIFF_PREVIEW_LINES: usize = 60;
const MAX_LISTED_FILES: usize = 15;
const MAX_EXEMPLAR_CHARS: usize = 300;

pub const SYSTEM_PROMPT: &str = "you are a developer writing concise conventional commit messages. \
you are given a summary of staged changes and a few commits from other projects as style references. \
reply with the commit message only, no commentary.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    Feat,
    Fix,
    Docs,
    Style,
    Refactor,
    Perf,
    Test,
    Build,
    Ci,
    Chore,
    Revert,
}

impl CommitType {
    pub const ALL: [CommitType; 11] = [
        CommitType::Feat,
        CommitType::Fix,
        CommitType::Docs,
        CommitType::Style,
        CommitType::Refactor,
        CommitType::Perf,
        CommitType::Test,
        CommitType::Build,
        CommitType::Ci,
        CommitType::Chore,
        CommitType::Revert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitType::Feat => "feat",
            CommitType::Fix => "fix",
            CommitType::Docs => "docs",
            CommitType::Style => "style",
            CommitType::Refactor => "refactor",
            CommitType::Perf => "perf",
            CommitType::Test => "test",
            CommitType::Build => "build",
            CommitType::Ci => "ci",
            CommitType::Chore => "chore",
            CommitType::Revert => "revert",
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommitType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown commit type '{s}'"))
    }
}

/// constraints on the shape of the generated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleConstraints {
    /// required conventional type, None leaves the choice to the model
    pub commit_type: Option<CommitType>,
    pub scope: Option<String>,
    pub max_subject_len: usize,
    pub allow_body: bool,
    /// free-form notes from the caller, e.g. why the change was made
    pub extra_context: Option<String>,
}

impl Default for StyleConstraints {
    fn default() -> Self {
        Self {
            commit_type: None,
            scope: None,
            max_subject_len: 72,
            allow_body: true,
            extra_context: None,
        }
    }
}

impl StyleConstraints {
    /// derive type and scope hints from the change summary
    pub fn infer(summary: &ChangeSummary, config: &StyleConfig) -> Self {
        let paths: Vec<String> = summary.paths().into_iter().map(str::to_string).collect();
        Self {
            commit_type: infer_commit_type(summary),
            scope: identify_scope(&paths),
            max_subject_len: config.max_subject_len,
            allow_body: config.allow_body,
            extra_context: None,
        }
    }
}

/// the inputs of one generation call
pub struct GenerationRequest<'a> {
    pub change_summary: &'a ChangeSummary,
    pub exemplars: &'a RetrievalResult<'a>,
    pub style: &'a StyleConstraints,
}

/// guess the conventional type from which kinds of files changed
///
/// returns None when the file mix does not point at a single type.
pub fn infer_commit_type(summary: &ChangeSummary) -> Option<CommitType> {
    let files = &summary.files_changed;
    if files.is_empty() {
        return None;
    }

    let all = |wanted: &[FileType]| files.iter().all(|f| wanted.contains(&f.file_type));

    if all(&[FileType::Documentation]) {
        return Some(CommitType::Docs);
    }
    if all(&[FileType::Test]) {
        return Some(CommitType::Test);
    }
    if all(&[FileType::Ci]) {
        return Some(CommitType::Ci);
    }
    if all(&[FileType::Build, FileType::Config]) {
        return if files.iter().any(|f| f.file_type == FileType::Build) {
            Some(CommitType::Build)
        } else {
            Some(CommitType::Chore)
        };
    }

    let only_new_files = files.iter().all(|f| f.change_kind == ChangeKind::Added);
    if only_new_files
        && summary.deletions == 0
        && files.iter().any(|f| f.file_type == FileType::SourceCode)
    {
        return Some(CommitType::Feat);
    }

    None
}

/// build the prompt sent to the generation client
pub fn compose_prompt(request: &GenerationRequest<'_>) -> String {
    let summary = request.change_summary;
    let style = request.style;
    let mut prompt = String::new();

    prompt.push_str("generate a conventional commit message for the following changes.\n\n");

    // change statistics
    prompt.push_str("📊 CHANGE SUMMARY:\n");
    prompt.push_str(&summary.stat_line());
    prompt.push('\n');

    prompt.push_str("\n📂 FILES:\n");
    for (i, file) in summary.files_changed.iter().enumerate() {
        if i >= MAX_LISTED_FILES {
            prompt.push_str(&format!(
                "... and {} more files\n",
                summary.files_changed.len() - MAX_LISTED_FILES
            ));
            break;
        }
        match (&file.old_path, file.change_kind) {
            (Some(old), ChangeKind::Renamed) => prompt.push_str(&format!(
                "- {} → {} (renamed, +{} -{})\n",
                old, file.path, file.additions, file.deletions
            )),
            _ => prompt.push_str(&format!(
                "- {} ({}, +{} -{})\n",
                file.path,
                file.change_kind.as_str(),
                file.additions,
                file.deletions
            )),
        }
    }

    if !summary.key_changes.is_empty() {
        prompt.push_str("\n🔧 KEY CHANGES:\n");
        for change in &summary.key_changes {
            prompt.push_str(&format!("- {change}\n"));
        }
    }

    let preview = extract_meaningful_diff_lines(&summary.raw_diff, MAX_DIFF_PREVIEW_LINES);
    if !preview.is_empty() {
        prompt.push_str("\n🔍 DIFF CONTENT (for context):\n");
        prompt.push_str(&truncate_with_ellipsis(&preview, MAX_DIFF_PREVIEW_CHARS));
        prompt.push('\n');
    }

    // retrieved exemplars, style only
    if !request.exemplars.is_empty() {
        prompt.push_str("\n📚 SIMILAR COMMITS FROM HISTORY (style reference only, do NOT copy them):\n");
        for (i, hit) in request.exemplars.iter().enumerate() {
            let message = truncate_with_ellipsis(hit.entry.commit_message.trim(), MAX_EXEMPLAR_CHARS);
            prompt.push_str(&format!(
                "{}. (similarity {:.2}) {}\n",
                i + 1,
                hit.score,
                message.replace('\n', "\n   ")
            ));
        }
    }

    if let Some(context) = style.extra_context.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n💬 ADDITIONAL CONTEXT FROM THE AUTHOR:\n");
        prompt.push_str(context.trim());
        prompt.push('\n');
    }

    prompt.push_str("\n📝 FORMAT:\n");
    let allowed: Vec<&str> = CommitType::ALL.iter().map(CommitType::as_str).collect();
    prompt.push_str(&format!("ALLOWED TYPES: {}\n", allowed.join(", ")));
    match style.commit_type {
        Some(commit_type) => prompt.push_str(&format!("type: {commit_type} (required)\n")),
        None => prompt.push_str("type: choose the best fit from the allowed types\n"),
    }
    match &style.scope {
        Some(scope) => prompt.push_str(&format!("scope: {scope}\n")),
        None => prompt.push_str("scope: optional, use a short module or folder name if one fits\n"),
    }

    prompt.push_str("\n🎯 INSTRUCTIONS:\n");
    prompt.push_str("1. first line: <type>(<scope>): <description>, imperative mood, lowercase, no trailing period\n");
    prompt.push_str(&format!(
        "2. the first line must be at most {} characters\n",
        style.max_subject_len
    ));
    if style.allow_body {
        prompt.push_str("3. optionally add a blank line followed by a short body with bullet points\n");
    } else {
        prompt.push_str("3. NO BODY - just the single line\n");
    }
    prompt.push_str("4. describe what changed in THIS diff; the similar commits only show the preferred tone\n");
    prompt.push('\n');

    prompt.push_str("generate the commit message now, with no additional commentary.\n");

    prompt
}

/// extract meaningful diff lines
pub fn extract_meaningful_diff_lines(diff_content: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = diff_content.lines().collect();
    let mut selected = vec![false; lines.len()];
    let mut line_count = 0;

    // prioritise added lines and important changes
    for (i, line) in lines.iter().enumerate() {
        if line_count >= max_lines {
            break;
        }
        if is_important_line(line) {
            selected[i] = true;
            line_count += 1;
        }
    }

    // fill remaining with context if needed
    for (i, line) in lines.iter().enumerate() {
        if line_count >= max_lines {
            break;
        }
        if !selected[i] && !line.trim().is_empty() && !is_patch_metadata(line) {
            selected[i] = true;
            line_count += 1;
        }
    }

    lines
        .iter()
        .zip(selected)
        .filter_map(|(line, keep)| keep.then_some(*line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// check if a line is important for ai context
fn is_important_line(line: &str) -> bool {
    if line.trim().is_empty() {
        return false;
    }

    // prioritise additions
    if line.starts_with('+') && !line.starts_with("+++") {
        let content = line.trim_start_matches('+').trim();

        // skip pure formatting lines
        if matches!(content, "{" | "}" | "(" | ")" | "") {
            return false;
        }

        // skip import-only lines unless they're significant
        if content.starts_with("import ") || content.starts_with("use ") {
            return content.contains(',') || content.len() > 50;
        }

        return true;
    }

    // include removals for context
    if line.starts_with('-') && !line.starts_with("---") {
        let content = line.trim_start_matches('-').trim();
        return !matches!(content, "{" | "}" | "");
    }

    // include file markers
    line.starts_with("@@") || line.starts_with("diff --git")
}

fn is_patch_metadata(line: &str) -> bool {
    line.starts_with("index ")
        || line.starts_with("new file mode")
        || line.starts_with("deleted file mode")
        || line.starts_with("similarity index")
}
