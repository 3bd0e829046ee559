use lazy_static::lazy_static;
use regex::Regex;

/// truncate a string to a maximum length with ellipsis
pub fn truncate_with_ellipsis(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        text.to_string()
    } else {
        // unicode-safe truncation so emoji never split
        let truncate_at = std::cmp::min(max_length.saturating_sub(3), text.len());
        let mut end_pos = truncate_at;

        while end_pos > 0 && !text.is_char_boundary(end_pos) {
            end_pos -= 1;
        }

        format!("{}...", &text[..end_pos])
    }
}

// directories that say nothing about what changed
const GENERIC_DIRS: &[&str] = &[
    "src", "lib", "app", "test", "tests", "spec", "specs", "crates", "packages", "pkg",
    "internal", "cmd",
];

/// identify likely scope of changes from file paths
///
/// takes the directory components every path shares, ignores generic ones
/// and returns the deepest of what is left.
pub fn identify_scope(file_paths: &[String]) -> Option<String> {
    lazy_static! {
        static ref SCOPE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    }

    let mut paths = file_paths.iter();
    let first = paths.next()?;
    let mut common: Vec<&str> = directories(first).collect();

    for path in paths {
        let dirs: Vec<&str> = directories(path).collect();
        let shared = common
            .iter()
            .zip(&dirs)
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }

    common
        .into_iter()
        .rev()
        .find(|dir| SCOPE_NAME.is_match(dir) && !GENERIC_DIRS.contains(&dir.to_lowercase().as_str()))
        .map(str::to_lowercase)
}

/// directory components of a path, without the file name
fn directories(path: &str) -> impl Iterator<Item = &str> {
    let dir = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    dir.split('/').filter(|c| !c.is_empty() && *c != ".")
}
