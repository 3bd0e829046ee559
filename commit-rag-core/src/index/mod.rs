// corpus index - tf-idf vector space over historical commits
//
// the vocabulary and idf weights are frozen at build time; queries must be
// projected through the same snapshot that produced the corpus vectors.

pub mod corpus;
pub mod tokenize;
pub mod vector;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IndexError;
pub use corpus::{CorpusRecord, fingerprint, load_corpus};
pub use vector::SparseVector;

/// bump when the artifact layout or tokenization rules change
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// keep only the most frequent terms across the corpus
    pub max_features: Option<usize>,
}

/// a historical commit and its normalized tf-idf vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub commit_message: String,
    pub diff_text: String,
    pub vector: SparseVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSpaceIndex {
    version: u32,
    options: IndexOptions,
    fingerprint: String,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f64>,
    entries: Vec<CorpusEntry>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// build a tf-idf index over the corpus
pub fn build_index(
    records: &[CorpusRecord],
    options: &IndexOptions,
) -> Result<VectorSpaceIndex, IndexError> {
    VectorSpaceIndex::build(records, options)
}

impl VectorSpaceIndex {
    pub fn build(records: &[CorpusRecord], options: &IndexOptions) -> Result<Self, IndexError> {
        if records.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let documents: Vec<Vec<String>> = records
            .iter()
            .map(|r| tokenize::tokenize_document(&r.message, &r.diff))
            .collect();

        let allowed = options
            .max_features
            .map(|limit| most_frequent_terms(&documents, limit));

        // document frequency, counted once per document
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for terms in &documents {
            let unique: BTreeSet<&str> = terms
                .iter()
                .map(String::as_str)
                .filter(|t| allowed.as_ref().is_none_or(|a| a.contains(*t)))
                .collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = records.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(df.len());
        for (dim, (term, count)) in df.iter().enumerate() {
            vocabulary.insert((*term).to_string(), dim as u32);
            idf.push(((1.0 + n) / (1.0 + *count as f64)).ln() + 1.0);
        }

        let mut index = Self {
            version: ARTIFACT_VERSION,
            options: options.clone(),
            fingerprint: fingerprint(records),
            vocabulary,
            idf,
            entries: Vec::with_capacity(records.len()),
        };

        for (position, (record, terms)) in records.iter().zip(&documents).enumerate() {
            let vector = index.weigh(terms);
            index.entries.push(CorpusEntry {
                id: record.id.clone().unwrap_or_else(|| position.to_string()),
                commit_message: record.message.clone(),
                diff_text: record.diff.clone(),
                vector,
            });
        }

        info!(
            documents = index.entries.len(),
            terms = index.vocabulary.len(),
            "built commit index"
        );
        Ok(index)
    }

    /// project diff or free text into this index's vector space
    ///
    /// terms outside the vocabulary are dropped; the result is unit length
    /// or the zero vector.
    pub fn project(&self, text: &str) -> SparseVector {
        self.weigh(&tokenize::tokenize_diff(text))
    }

    fn weigh(&self, terms: &[String]) -> SparseVector {
        let mut tf: BTreeMap<u32, usize> = BTreeMap::new();
        for term in terms {
            if let Some(dim) = self.vocabulary.get(term) {
                *tf.entry(*dim).or_insert(0) += 1;
            }
        }

        let weighted = tf
            .into_iter()
            .map(|(dim, count)| (dim, count as f64 * self.idf[dim as usize]))
            .collect();
        let mut vector = SparseVector::from_sorted(weighted);
        vector.normalize();
        vector
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary
            .get(term)
            .map(|dim| self.idf[*dim as usize])
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// fingerprint of the corpus this index was built from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// write the index artifact; the file is replaced atomically
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let io_err = |source: std::io::Error| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec(self)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, bytes).map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)?;

        debug!(path = %path.display(), "saved commit index");
        Ok(())
    }

    /// restore an index written by [`VectorSpaceIndex::save`]
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let header: VersionHeader = serde_json::from_slice(&bytes)?;
        if header.version != ARTIFACT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: header.version,
                expected: ARTIFACT_VERSION,
            });
        }

        let index: Self = serde_json::from_slice(&bytes)?;
        index.check_consistency()?;
        debug!(
            path = %path.display(),
            documents = index.entries.len(),
            "restored commit index"
        );
        Ok(index)
    }

    /// vocabulary, idf and entry vectors must describe the same space
    fn check_consistency(&self) -> Result<(), IndexError> {
        let dims = self.idf.len();
        if self.vocabulary.len() != dims {
            return Err(IndexError::Corrupt(format!(
                "{} vocabulary terms but {} idf weights",
                self.vocabulary.len(),
                dims
            )));
        }
        if let Some((term, dim)) = self.vocabulary.iter().find(|(_, dim)| **dim as usize >= dims) {
            return Err(IndexError::Corrupt(format!(
                "term '{term}' maps to dimension {dim} of {dims}"
            )));
        }
        if self.idf.iter().any(|w| !w.is_finite()) {
            return Err(IndexError::Corrupt("non-finite idf weight".to_string()));
        }
        if let Some(entry) = self.entries.iter().find(|e| !e.vector.fits(dims)) {
            return Err(IndexError::Corrupt(format!(
                "vector of entry '{}' is unsorted or out of range",
                entry.id
            )));
        }
        Ok(())
    }
}

/// the `limit` most frequent terms, ties broken alphabetically
fn most_frequent_terms(documents: &[Vec<String>], limit: usize) -> HashSet<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for term in documents.iter().flatten() {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(term, _)| term.to_string())
        .collect()
}
