// term extraction shared by index build and query projection
//
// both sides must run exactly the same rules, otherwise query vectors land
// in a different space from the corpus vectors.

use lazy_static::lazy_static;
use regex::Regex;

const MIN_TERM_LEN: usize = 2;

lazy_static! {
    static ref TERM: Regex = Regex::new(r"[a-z0-9_]+").unwrap();
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "are", "as", "at", "be", "been", "but",
    "by", "can", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "his",
    "how", "if", "in", "into", "is", "it", "its", "me", "more", "my", "no", "not", "of", "on",
    "or", "our", "out", "she", "so", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "too", "up", "us", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "why", "will", "with", "you",
    "your",
];

/// diff lines that describe the patch itself rather than the change
const METADATA_PREFIXES: &[&str] = &[
    "diff --git",
    "index ",
    "@@",
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "similarity index",
    "dissimilarity index",
    "rename from",
    "rename to",
    "copy from",
    "copy to",
    "Binary files",
    "\\ No newline",
];

/// terms of free text such as a commit message
pub fn tokenize_text(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    push_terms(text, &mut terms);
    terms
}

/// terms of unified diff text, skipping patch metadata
///
/// file header lines contribute only their path; content lines lose their
/// leading `+`, `-` or space marker.
pub fn tokenize_diff(diff: &str) -> Vec<String> {
    let mut terms = Vec::new();

    for line in diff.lines() {
        if METADATA_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            continue;
        }

        if let Some(path) = line
            .strip_prefix("--- ")
            .or_else(|| line.strip_prefix("+++ "))
        {
            let path = path.split('\t').next().unwrap_or(path).trim();
            if path != "/dev/null" {
                let path = path
                    .strip_prefix("a/")
                    .or_else(|| path.strip_prefix("b/"))
                    .unwrap_or(path);
                push_terms(path, &mut terms);
            }
            continue;
        }

        let content = match line.as_bytes().first() {
            Some(b'+') | Some(b'-') | Some(b' ') => &line[1..],
            _ => line,
        };
        push_terms(content, &mut terms);
    }

    terms
}

/// terms of a corpus document: message followed by its diff
pub fn tokenize_document(message: &str, diff: &str) -> Vec<String> {
    let mut terms = tokenize_text(message);
    terms.extend(tokenize_diff(diff));
    terms
}

fn push_terms(text: &str, terms: &mut Vec<String>) {
    let lowered = text.to_lowercase();
    for m in TERM.find_iter(&lowered) {
        let term = m.as_str();
        if is_indexable(term) {
            terms.push(term.to_string());
        }
    }
}

fn is_indexable(term: &str) -> bool {
    term.len() >= MIN_TERM_LEN
        && !term.bytes().all(|b| b.is_ascii_digit())
        && !STOP_WORDS.contains(&term)
}
