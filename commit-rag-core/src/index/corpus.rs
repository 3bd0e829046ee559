// corpus loading - historical (message, diff) pairs from a json or json lines file

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::IndexError;

/// one historical commit as stored in the corpus file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    #[serde(default, alias = "sha", alias = "commit_sha")]
    pub id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub diff: String,
}

impl CorpusRecord {
    pub fn new(message: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
            diff: diff.into(),
        }
    }
}

/// load corpus records from a csv table, a json array or a json lines file
///
/// `.csv` files are read as a table with a header row; anything else is
/// treated as json. records with an empty message are dropped.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusRecord>, IndexError> {
    let content = fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let records = if is_csv {
        parse_csv_corpus(&content)?
    } else {
        parse_corpus(&content)?
    };
    debug!(path = %path.display(), records = records.len(), "loaded commit corpus");
    Ok(records)
}

pub fn parse_corpus(content: &str) -> Result<Vec<CorpusRecord>, IndexError> {
    let trimmed = content.trim_start();
    let raw: Vec<CorpusRecord> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };

    Ok(drop_empty_messages(raw))
}

/// csv with a header row; extra columns (author, repo, url, ...) are ignored
pub fn parse_csv_corpus(content: &str) -> Result<Vec<CorpusRecord>, IndexError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let raw = reader
        .deserialize::<CorpusRecord>()
        .collect::<Result<Vec<_>, _>>()?;

    Ok(drop_empty_messages(raw))
}

fn drop_empty_messages(raw: Vec<CorpusRecord>) -> Vec<CorpusRecord> {
    let total = raw.len();
    let records: Vec<CorpusRecord> = raw
        .into_iter()
        .filter(|r| !r.message.trim().is_empty())
        .collect();
    if records.len() < total {
        warn!(
            dropped = total - records.len(),
            "skipped corpus records without a commit message"
        );
    }
    records
}

/// sha-256 over the record contents, used to detect a stale index artifact
pub fn fingerprint(records: &[CorpusRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.id.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(record.message.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.diff.as_bytes());
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}
