// validation and message processing module

use anyhow::{Result, anyhow};

use crate::error::GenerationError;

use super::prompts::CommitType;

/// subject and optional body split out of a raw model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub subject: String,
    pub body: Option<String>,
}

/// strictly parse a model response into subject and body
///
/// the subject is the first line of the first paragraph; everything else up
/// to and after the first blank line becomes the body. a response whose
/// subject is not a conventional `type(scope)!: description` line with a
/// known type is treated as empty, so refusals and prose never pass as
/// commit messages.
pub fn parse_response(raw: &str, max_subject_len: usize) -> Result<ParsedMessage, GenerationError> {
    let cleaned = strip_wrappers(raw);
    let lines: Vec<&str> = cleaned
        .lines()
        .map(str::trim_end)
        .skip_while(|line| line.trim().is_empty() || is_preamble(line))
        .collect();

    let Some((first, rest)) = lines.split_first() else {
        return Err(GenerationError::empty_response(
            "model response contained no commit message",
        ));
    };

    let subject = post_process_subject(first.trim(), max_subject_len);
    if subject.is_empty() {
        return Err(GenerationError::empty_response(
            "model response has an empty subject line",
        ));
    }
    if let Err(e) = check_shape(&subject) {
        return Err(GenerationError::empty_response(format!(
            "model response is not a conventional commit ({e}): {subject:?}"
        )));
    }

    let body = clean_body(rest);
    Ok(ParsedMessage {
        subject,
        body: (!body.is_empty()).then_some(body),
    })
}

/// conventional type of a subject line, if it has one
pub fn commit_type_of(subject: &str) -> Option<CommitType> {
    let colon_pos = subject.find(':')?;
    let type_part = subject[..colon_pos]
        .split('(')
        .next()
        .unwrap_or("")
        .trim_end_matches('!');
    type_part.parse().ok()
}

/// remove code fences and one pair of quotes wrapping the whole response
fn strip_wrappers(raw: &str) -> String {
    let trimmed = unquote(raw.trim());

    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .trim_matches('`')
        .to_string()
}

/// inner text when the same quote char opens and closes the text
fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}

/// lines like "here's the commit message:" that precede the actual message
fn is_preamble(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    let lead_ins = [
        "here's",
        "here is",
        "sure",
        "commit message:",
        "generated commit",
        "suggested commit",
    ];
    lower.ends_with(':') && lead_ins.iter().any(|p| lower.starts_with(p))
}

fn clean_body(lines: &[&str]) -> String {
    let mut cleaned: Vec<String> = Vec::new();

    for line in lines {
        let trimmed = line.trim();

        // skip meta-commentary
        if trimmed.starts_with("Note:") || trimmed.starts_with("Explanation:") {
            continue;
        }

        // ensure consistent bullet format
        if let Some(content) = trimmed.strip_prefix("* ").or_else(|| trimmed.strip_prefix("• ")) {
            cleaned.push(format!("- {}", content.trim()));
        } else {
            cleaned.push(line.trim_end().to_string());
        }
    }

    // collapse leading/trailing blank lines
    let text = cleaned.join("\n");
    text.trim_matches('\n').trim().to_string()
}

/// post-process the subject to meet the conventional style
pub fn post_process_subject(subject: &str, max_len: usize) -> String {
    let subject = subject.trim().trim_matches('`').trim();

    let Some(colon_pos) = subject.find(':') else {
        return subject.trim_end_matches('.').to_string();
    };
    let type_scope = subject[..colon_pos].trim_end();
    let mut description = subject[colon_pos + 1..].trim().to_string();

    if description.is_empty() {
        return subject.to_string();
    }

    // ensure lowercase first letter
    if let Some(first) = description.chars().next() {
        if first.is_uppercase() && !description.chars().nth(1).is_some_and(char::is_uppercase) {
            description = first.to_lowercase().to_string() + &description[first.len_utf8()..];
        }
    }

    // remove period at the end
    while description.ends_with('.') {
        description.pop();
    }

    let prefix_len = type_scope.len() + 2;
    if prefix_len + description.len() > max_len {
        if let Some(shortened) = shorten_description(&description, max_len.saturating_sub(prefix_len)) {
            description = shortened;
        }
    }

    format!("{type_scope}: {description}")
}

/// validate that the subject follows the conventional commits format
pub fn validate_commit_message(subject: &str, max_len: usize) -> Result<()> {
    check_shape(subject)?;

    if subject.chars().count() > max_len {
        return Err(anyhow!(
            "subject too long ({} chars), must be ≤{} characters",
            subject.chars().count(),
            max_len
        ));
    }

    Ok(())
}

/// `type(scope)!: description` with a known type, length aside
fn check_shape(subject: &str) -> Result<()> {
    if subject.trim().is_empty() {
        return Err(anyhow!("commit message is empty"));
    }

    let Some(colon_pos) = subject.find(": ") else {
        return Err(anyhow!(
            "invalid format: expected 'type: description' or 'type(scope): description'"
        ));
    };

    let head = &subject[..colon_pos];
    let description = &subject[colon_pos + 2..];
    let head = head.trim_end_matches('!');

    let (type_part, scope) = match head.split_once('(') {
        Some((type_part, rest)) => {
            let Some(scope) = rest.strip_suffix(')') else {
                return Err(anyhow!("invalid format: unclosed scope in '{head}'"));
            };
            (type_part, Some(scope))
        }
        None => (head, None),
    };

    if type_part.parse::<CommitType>().is_err() {
        let allowed: Vec<&str> = CommitType::ALL.iter().map(CommitType::as_str).collect();
        return Err(anyhow!(
            "invalid type '{}', must be one of: {}",
            type_part,
            allowed.join(", ")
        ));
    }

    if let Some(scope) = scope {
        if scope.is_empty()
            || !scope.chars().all(|c| {
                c.is_alphanumeric() || matches!(c, '-' | '_' | ',' | '.' | '/')
            })
        {
            return Err(anyhow!(
                "invalid scope '{}', must be a noun (alphanumeric, hyphens, underscores, commas, dots, or forward slashes only)",
                scope
            ));
        }
    }

    if description.trim().is_empty() {
        return Err(anyhow!("description cannot be empty"));
    }

    Ok(())
}

/// shorten a commit description to fit within the limit
fn shorten_description(description: &str, limit: usize) -> Option<String> {
    if description.len() <= limit {
        return Some(description.to_string());
    }

    // remove redundant words
    let shortened = description
        .replace("functionality", "func")
        .replace("configuration", "config")
        .replace("implementation", "impl")
        .replace("documentation", "docs")
        .replace("repository", "repo")
        .replace("database", "db")
        .replace("application", "app")
        .replace("environment", "env")
        .replace("authentication", "auth")
        .replace("information", "info");

    if shortened.len() <= limit {
        return Some(shortened);
    }

    // remove filler words
    let filler_words = ["the", "a", "an", "for", "with", "to", "in", "of"];
    let shortened = shortened
        .split_whitespace()
        .filter(|w| !filler_words.contains(w))
        .collect::<Vec<_>>()
        .join(" ");

    (shortened.len() <= limit).then_some(shortened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_subject_and_body_on_first_blank_line() {
        let parsed = parse_response(
            "feat(cache): add lru eviction\n\n* Track recency per key\n* Evict oldest entry\n",
            72,
        )
        .unwrap();
        assert_eq!(parsed.subject, "feat(cache): add lru eviction");
        assert_eq!(
            parsed.body.as_deref(),
            Some("- Track recency per key\n- Evict oldest entry")
        );
    }

    #[test]
    fn single_line_has_no_body() {
        let parsed = parse_response("fix: Stop loop at last index.", 72).unwrap();
        assert_eq!(parsed.subject, "fix: stop loop at last index");
        assert_eq!(parsed.body, None);
    }

    #[test]
    fn strips_fences_and_preamble() {
        let raw = "Here's the commit message:\n```\nrefactor(index): split tokenizer\n```";
        let parsed = parse_response(raw, 72).unwrap();
        assert_eq!(parsed.subject, "refactor(index): split tokenizer");
        assert_eq!(parsed.body, None);
    }

    #[test]
    fn empty_or_blank_responses_fail() {
        for raw in ["", "   \n\n", "```\n```", "\"\""] {
            let err = parse_response(raw, 72).unwrap_err();
            assert_eq!(err.kind, GenerationErrorKind::EmptyResponse, "input {raw:?}");
        }
    }

    #[test]
    fn prose_and_unknown_types_are_rejected() {
        for raw in [
            "I'm sorry, I cannot help with that request.",
            "The diff changes the loop bound.\n\nIt looks fine.",
            "feature: add caching layer",
            "fix(a b): stop early",
            "fix:",
        ] {
            let err = parse_response(raw, 72).unwrap_err();
            assert_eq!(err.kind, GenerationErrorKind::EmptyResponse, "input {raw:?}");
        }
    }

    #[test]
    fn over_long_subject_still_parses() {
        let raw = "feat: introduce a streaming tokenizer that keeps memory flat on huge diffs";
        let parsed = parse_response(raw, 40).unwrap();
        assert!(parsed.subject.starts_with("feat: "));
        assert!(validate_commit_message(&parsed.subject, 40).is_err());
    }

    #[test]
    fn inner_quotes_survive() {
        let parsed = parse_response("fix: handle \"quoted\"", 72).unwrap();
        assert_eq!(parsed.subject, "fix: handle \"quoted\"");

        let parsed = parse_response("'docs: explain the 'k' option'", 72).unwrap();
        assert_eq!(parsed.subject, "docs: explain the 'k' option");

        let parsed = parse_response("\"feat(cli): add search\"", 72).unwrap();
        assert_eq!(parsed.subject, "feat(cli): add search");
    }

    #[test]
    fn long_subjects_are_shortened_when_possible() {
        let subject = "feat: add the configuration for the authentication of the application users";
        let processed = post_process_subject(subject, 72);
        assert!(processed.len() <= 72, "{processed}");
        assert!(processed.starts_with("feat: add the config for the auth"));
    }

    #[test]
    fn keeps_acronyms_capitalised() {
        assert_eq!(post_process_subject("docs: README tweaks", 72), "docs: README tweaks");
    }

    #[test]
    fn validates_conventional_subjects() {
        assert!(validate_commit_message("fix(loop): stop at last index", 72).is_ok());
        assert!(validate_commit_message("feat!: drop legacy api", 72).is_ok());
        assert!(validate_commit_message("update stuff", 72).is_err());
        assert!(validate_commit_message("feature: add x", 72).is_err());
        assert!(validate_commit_message("fix(a b): x", 72).is_err());
        assert!(validate_commit_message("fix: a very long description", 10).is_err());
    }

    #[test]
    fn reads_commit_type() {
        assert_eq!(commit_type_of("fix(loop)!: x"), Some(CommitType::Fix));
        assert_eq!(commit_type_of("nope: x"), None);
        assert_eq!(commit_type_of("no colon"), None);
    }
}
