use serde::Serialize;
use tracing::debug;

use crate::index::{CorpusEntry, VectorSpaceIndex};

/// one retrieved exemplar with its cosine similarity
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetrievalHit<'a> {
    /// insertion position in the corpus
    pub position: usize,
    pub entry: &'a CorpusEntry,
    pub score: f64,
}

/// hits ordered by descending score, ties in corpus order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult<'a> {
    pub hits: Vec<RetrievalHit<'a>>,
}

impl<'a> RetrievalResult<'a> {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.entry.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievalHit<'a>> {
        self.hits.iter()
    }
}

/// top-k most similar corpus entries for a query diff
///
/// a query with no known terms scores 0 against everything, which yields the
/// first k entries in corpus order. `k == 0` gives an empty result and k is
/// clamped to the corpus size.
pub fn retrieve<'a>(query_text: &str, index: &'a VectorSpaceIndex, k: usize) -> RetrievalResult<'a> {
    if k == 0 || index.is_empty() {
        return RetrievalResult::default();
    }
    let k = k.min(index.len());

    let query = index.project(query_text);
    let zero_query = query.is_zero();

    let mut scored: Vec<(usize, f64)> = index
        .entries()
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let score = if zero_query {
                0.0
            } else {
                entry.vector.dot(&query).clamp(0.0, 1.0)
            };
            (position, score)
        })
        .collect();

    // stable sort keeps corpus order among equal scores
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);

    debug!(
        k,
        zero_query,
        top_score = scored.first().map(|s| s.1).unwrap_or(0.0),
        "retrieved similar commits"
    );

    RetrievalResult {
        hits: scored
            .into_iter()
            .map(|(position, score)| RetrievalHit {
                position,
                entry: &index.entries()[position],
                score,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{CorpusRecord, IndexOptions, build_index};
    use pretty_assertions::assert_eq;

    fn index() -> VectorSpaceIndex {
        build_index(
            &[
                CorpusRecord::new("fix: correct off-by-one in loop", "--- a/loop.py\n+++ b/loop.py\n-for i in range(n + 1):\n+for i in range(n):"),
                CorpusRecord::new("feat: add caching layer", "--- /dev/null\n+++ b/cache.py\n+class Cache:\n+    store = {}"),
                CorpusRecord::new("docs: explain cache usage", "+++ b/README.md\n+cache usage"),
            ],
            &IndexOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn scores_are_bounded_and_sorted() {
        let index = index();
        let result = retrieve("+++ b/cache.py\n+cache store", &index, 3);
        assert_eq!(result.len(), 3);
        for hit in result.iter() {
            assert!((0.0..=1.0).contains(&hit.score));
        }
        assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(result.hits[0].entry.id, "1");
    }

    #[test]
    fn k_boundaries() {
        let index = index();
        assert!(retrieve("+loop", &index, 0).is_empty());
        assert_eq!(retrieve("+loop", &index, 10).len(), 3);
    }

    #[test]
    fn zero_vector_query_falls_back_to_corpus_order() {
        let index = index();
        let result = retrieve("+qwerty zxcvb", &index, 2);
        let positions: Vec<usize> = result.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert!(result.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn repeated_retrieval_is_identical() {
        let index = index();
        let a: Vec<(String, f64)> = retrieve("+loop range", &index, 3)
            .iter()
            .map(|h| (h.entry.id.clone(), h.score))
            .collect();
        let b: Vec<(String, f64)> = retrieve("+loop range", &index, 3)
            .iter()
            .map(|h| (h.entry.id.clone(), h.score))
            .collect();
        assert_eq!(a, b);
    }
}
