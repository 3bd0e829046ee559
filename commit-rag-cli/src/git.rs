use anyhow::{Context, Result};
use git2::{Diff, DiffFormat, DiffOptions, Repository};
use std::path::Path;
use tracing::debug;

/// unified diff text read from a repository
pub struct WorkingDiff {
    pub text: String,
    /// false when nothing was staged and the working tree was used instead
    pub staged: bool,
}

/// diff of the staged changes, falling back to unstaged changes
pub fn working_diff(repo_path: &Path, max_file_size: usize) -> Result<WorkingDiff> {
    // open the repository
    let repo = Repository::discover(repo_path).context("failed to open git repository")?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.show_binary(false);

    // an unborn HEAD diffs the whole index as added files
    let head_tree = repo.head().ok().and_then(|head| head.peel_to_tree().ok());
    let staged = repo
        .diff_tree_to_index(head_tree.as_ref(), None, Some(&mut diff_opts))
        .context("failed to diff the index against HEAD")?;
    let text = render_patch(&staged, max_file_size)?;
    if !text.is_empty() {
        return Ok(WorkingDiff { text, staged: true });
    }

    debug!("no staged changes found, checking the working directory");
    diff_opts.include_untracked(true);
    diff_opts.recurse_untracked_dirs(true);
    diff_opts.show_untracked_content(true);
    let unstaged = repo
        .diff_index_to_workdir(None, Some(&mut diff_opts))
        .context("failed to diff the working directory against the index")?;

    Ok(WorkingDiff {
        text: render_patch(&unstaged, max_file_size)?,
        staged: false,
    })
}

/// render a diff as unified patch text, skipping binary and oversized files
fn render_patch(diff: &Diff<'_>, max_file_size: usize) -> Result<String> {
    let mut patch = String::new();

    diff.print(DiffFormat::Patch, |delta, _, line| {
        if delta.new_file().is_binary() || delta.old_file().is_binary() {
            return true;
        }

        let file_size = match delta.new_file().size() {
            0 => delta.old_file().size(), // file might have been deleted
            size => size,
        };
        if file_size > max_file_size as u64 {
            if let Some(path) = delta.new_file().path() {
                debug!(path = %path.display(), size = file_size, "skipping large file");
            }
            return true;
        }

        let content = decode_line_content(line.content());
        match line.origin() {
            origin @ ('+' | '-' | ' ') => {
                patch.push(origin);
                patch.push_str(&content);
            }
            // file headers, hunk headers and eof markers carry their own text
            _ => patch.push_str(&content),
        }
        true
    })
    .context("failed to render diff")?;

    Ok(patch)
}

/// decode line content with appropriate encoding
fn decode_line_content(content: &[u8]) -> String {
    let (cow, _encoding_used, had_errors) = encoding_rs::UTF_8.decode(content);

    if had_errors {
        // fall back to lossy conversion if there were decoding errors
        String::from_utf8_lossy(content).to_string()
    } else {
        cow.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn stage_all(repo: &Repository) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    }

    fn commit_all(repo: &Repository, message: &str) {
        let tree_id = stage_all(repo);
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn staged_files_in_a_fresh_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();
        stage_all(&repo);

        let diff = working_diff(dir.path(), 100 * 1024).unwrap();
        assert!(diff.staged);
        assert!(diff.text.contains("diff --git a/hello.txt b/hello.txt"));
        assert!(diff.text.contains("+hello\n"));

        let summary = commit_rag_core::analyze_diff(&diff.text);
        let paths: Vec<&str> = summary.files_changed.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["hello.txt"]);
        assert_eq!((summary.additions, summary.deletions), (1, 0));
    }

    #[test]
    fn falls_back_to_unstaged_changes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();
        commit_all(&repo, "initial");

        fs::write(dir.path().join("hello.txt"), "world\n").unwrap();
        let diff = working_diff(dir.path(), 100 * 1024).unwrap();
        assert!(!diff.staged);
        assert!(diff.text.contains("-hello\n"));
        assert!(diff.text.contains("+world\n"));

        let summary = commit_rag_core::analyze_diff(&diff.text);
        assert_eq!((summary.additions, summary.deletions), (1, 1));
    }

    #[test]
    fn clean_tree_gives_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();
        commit_all(&repo, "initial");

        let diff = working_diff(dir.path(), 100 * 1024).unwrap();
        assert_eq!(diff.text, "");
        assert!(!diff.staged);
    }

    #[test]
    fn oversized_files_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(4096)).unwrap();
        stage_all(&repo);

        let diff = working_diff(dir.path(), 1024).unwrap();
        assert!(!diff.text.contains("big.txt"));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        assert_eq!(decode_line_content(b"caf\xc3\xa9\n"), "café\n");
        assert_eq!(decode_line_content(b"bad \xff byte"), "bad \u{fffd} byte");
    }
}
