// engine - owns config, the generation client and the shared commit index
//
// the index slot is filled once (restore or build) and afterwards only
// replaced wholesale; readers clone the Arc and never see a partial index.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ai::{self, GeneratedMessage, GenerationClient, GenerationRequest, StyleConstraints};
use crate::config::{Config, IndexConfig};
use crate::diff::{self, ChangeSummary};
use crate::error::EngineError;
use crate::index::{self, CorpusRecord, IndexOptions, VectorSpaceIndex};
use crate::retrieval::retrieve;

/// a retrieved commit detached from the index it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCommit {
    pub position: usize,
    pub id: String,
    pub commit_message: String,
    pub score: f64,
}

pub struct Engine {
    config: Config,
    client: Arc<dyn GenerationClient>,
    index: RwLock<Option<Arc<VectorSpaceIndex>>>,
    // one builder at a time
    build_lock: Mutex<()>,
}

impl Engine {
    /// the index is restored or built on first use
    pub fn new(config: Config, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            config,
            client,
            index: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn with_index(config: Config, client: Arc<dyn GenerationClient>, index: VectorSpaceIndex) -> Self {
        Self {
            config,
            client,
            index: RwLock::new(Some(Arc::new(index))),
            build_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn analyze_diff(&self, diff_text: &str) -> ChangeSummary {
        diff::analyze(diff_text)
    }

    /// the current index, if one has been loaded
    pub fn loaded_index(&self) -> Option<Arc<VectorSpaceIndex>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// the shared index, restoring or building it on first call
    pub async fn index(&self) -> Result<Arc<VectorSpaceIndex>, EngineError> {
        if let Some(index) = self.loaded_index() {
            return Ok(index);
        }

        let _guard = self.build_lock.lock().await;
        // another caller may have finished while we waited
        if let Some(index) = self.loaded_index() {
            return Ok(index);
        }

        // file reads and fitting stay off the async workers
        let settings = self.config.index.clone();
        let options = self.config.index_options();
        let built = tokio::task::spawn_blocking(move || load_or_build(&settings, &options)).await??;

        let index = Arc::new(built);
        self.install(Arc::clone(&index));
        Ok(index)
    }

    /// build a fresh index from `records` and swap it in
    pub async fn rebuild(&self, records: &[CorpusRecord]) -> Result<Arc<VectorSpaceIndex>, EngineError> {
        let _guard = self.build_lock.lock().await;

        let index = Arc::new(index::build_index(records, &self.config.index_options())?);
        persist(self.config.index.artifact_path.as_deref(), &index);
        self.install(Arc::clone(&index));
        Ok(index)
    }

    /// retrieval only, no generation call
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SimilarCommit>, EngineError> {
        let index = self.index().await?;
        let result = retrieve(query, &index, k);

        Ok(result
            .iter()
            .map(|hit| SimilarCommit {
                position: hit.position,
                id: hit.entry.id.clone(),
                commit_message: hit.entry.commit_message.clone(),
                score: hit.score,
            })
            .collect())
    }

    pub async fn generate_commit_message(
        &self,
        diff_text: &str,
        k: usize,
    ) -> Result<GeneratedMessage, EngineError> {
        self.generate_with_context(diff_text, k, None).await
    }

    /// like [`Engine::generate_commit_message`] with caller notes added to the prompt
    pub async fn generate_with_context(
        &self,
        diff_text: &str,
        k: usize,
        extra_context: Option<&str>,
    ) -> Result<GeneratedMessage, EngineError> {
        let summary = self.analyze_diff(diff_text);
        if summary.is_empty() {
            return Err(EngineError::NoChanges);
        }

        let index = self.index().await?;
        let exemplars = retrieve(diff_text, &index, k);
        debug!(
            files = summary.files_changed.len(),
            exemplars = exemplars.len(),
            "prepared generation request"
        );

        let mut style = StyleConstraints::infer(&summary, &self.config.style);
        style.extra_context = extra_context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let request = GenerationRequest {
            change_summary: &summary,
            exemplars: &exemplars,
            style: &style,
        };

        let options = self.config.generation_options();
        let message = ai::generate(&request, self.client.as_ref(), &options).await?;
        Ok(message)
    }

    fn install(&self, index: Arc<VectorSpaceIndex>) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }
}

fn load_or_build(settings: &IndexConfig, options: &IndexOptions) -> Result<VectorSpaceIndex, EngineError> {
    let Some(corpus_path) = &settings.corpus_path else {
        // no corpus to check against, trust the artifact as is
        return match &settings.artifact_path {
            Some(artifact) => Ok(VectorSpaceIndex::load(artifact)?),
            None => Err(EngineError::IndexNotReady),
        };
    };

    let records = index::load_corpus(corpus_path)?;

    if let Some(artifact) = settings.artifact_path.as_deref().filter(|p| p.exists()) {
        match VectorSpaceIndex::load(artifact) {
            Ok(restored)
                if restored.fingerprint() == index::fingerprint(&records)
                    && restored.options() == options =>
            {
                info!(path = %artifact.display(), "restored commit index");
                return Ok(restored);
            }
            Ok(_) => info!(path = %artifact.display(), "index artifact is stale, rebuilding"),
            Err(e) => warn!(path = %artifact.display(), error = %e, "ignoring unreadable index artifact"),
        }
    }

    let built = index::build_index(&records, options)?;
    persist(settings.artifact_path.as_deref(), &built);
    Ok(built)
}

// save failures are logged, never returned
fn persist(path: Option<&Path>, index: &VectorSpaceIndex) {
    if let Some(path) = path {
        if let Err(e) = index.save(path) {
            warn!(path = %path.display(), error = %e, "failed to save commit index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use std::fs;

    struct Unused;

    #[async_trait]
    impl GenerationClient for Unused {
        async fn complete(&self, _: &str, _: u32, _: f32) -> Result<String, GenerationError> {
            Err(GenerationError::unavailable("not expected in this test"))
        }
    }

    const CORPUS: &str = r#"{"id": "a1", "message": "fix: stop loop early", "diff": "+++ b/loop.py\n+break"}
{"id": "b2", "message": "docs: add usage", "diff": "+++ b/README.md\n+usage"}
"#;

    fn engine_with(corpus: Option<&str>, artifact: bool, dir: &std::path::Path) -> Engine {
        let mut config = Config::default();
        if let Some(content) = corpus {
            let path = dir.join("corpus.jsonl");
            fs::write(&path, content).unwrap();
            config.index.corpus_path = Some(path);
        }
        if artifact {
            config.index.artifact_path = Some(dir.join("index.json"));
        }
        Engine::new(config, Arc::new(Unused))
    }

    #[tokio::test]
    async fn first_use_builds_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(Some(CORPUS), true, dir.path());
        assert!(engine.loaded_index().is_none());

        let index = engine.index().await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(dir.path().join("index.json").exists());

        // second call reuses the same snapshot
        let again = engine.index().await.unwrap();
        assert!(Arc::ptr_eq(&index, &again));
    }

    #[tokio::test]
    async fn no_source_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(None, false, dir.path());
        assert!(matches!(engine.index().await, Err(EngineError::IndexNotReady)));
    }

    #[tokio::test]
    async fn artifact_alone_is_enough() {
        let dir = tempfile::tempdir().unwrap();
        let builder = engine_with(Some(CORPUS), true, dir.path());
        builder.index().await.unwrap();

        let mut config = Config::default();
        config.index.artifact_path = Some(dir.path().join("index.json"));
        let engine = Engine::new(config, Arc::new(Unused));
        assert_eq!(engine.index().await.unwrap().len(), 2);
    }

    #[test]
    fn analyze_is_pure() {
        let engine = Engine::new(Config::default(), Arc::new(Unused));
        let summary = engine.analyze_diff("");
        assert!(summary.is_empty());
        assert_eq!(summary.additions, 0);
        assert_eq!(summary.deletions, 0);
    }
}
