//! Retrieval orchestrator.
//!
//! Ties the content cache, embedding provider and flat index together:
//! resolves each source line to its derived text through the cache,
//! batch-encodes the resolved corpus, builds or reuses the persisted
//! index, and maps search ordinals back to URLs.
//!
//! The positional invariant lives here: the i-th vector in the index
//! corresponds to the i-th element of the retained corpus for as long as
//! that index/corpus pair stays associated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::retriever::cache::{CacheError, ContentCache};
use crate::retriever::embeddings::{Embedder, EmbeddingError};
use crate::retriever::index::{FlatIndex, IndexError, NO_MATCH};
use crate::retriever::storage::{IndexStorage, IndexStorageError};
use crate::retriever::DistanceMetric;
use crate::sources::{load_source_lines, SourceError, SourceLine};

/// Message reported by `search` when no index has been built yet.
pub const NOT_BUILT_MESSAGE: &str = "index not built; run build_index first";

/// Errors that can occur during retriever operations.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Index storage error: {0}")]
    IndexStorage(#[from] IndexStorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Policy for reusing a persisted index when `force_rebuild` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// Load the persisted index verbatim and trust the caller's lines to
    /// match it. Cheap, but serves stale results if the sources changed.
    Reuse,
    /// Compare the fingerprint stored with the index against the current
    /// lines; rebuild automatically on mismatch.
    Strict,
}

impl Default for ReusePolicy {
    fn default() -> Self {
        ReusePolicy::Reuse
    }
}

/// Explicit configuration for a retriever instance. Distinct temp paths
/// give test isolation; nothing here is process-global.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub cache_path: PathBuf,
    pub index_path: PathBuf,
    pub metric: DistanceMetric,
    pub reuse_policy: ReusePolicy,
}

/// Index lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No build has happened yet.
    Absent,
    /// A persisted index was loaded and is serving searches.
    Loaded,
    /// A building pass is in progress.
    Building,
    /// A fresh index was built and is serving searches.
    Ready,
    /// A build ran but no line resolved to non-empty text.
    Empty,
}

/// Per-build report: which lines made it into the corpus and which were
/// dropped, returned to the caller instead of printed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Raw lines that resolved to derived text, in corpus order.
    pub resolved: Vec<String>,
    /// Raw lines that resolved to nothing and were dropped.
    pub skipped: Vec<String>,
    /// True when a persisted index was reused instead of rebuilt.
    pub reused_index: bool,
    /// How many resolved lines were answered by the cache.
    pub from_cache: usize,
    /// How many resolved lines invoked the resolver.
    pub newly_resolved: usize,
}

/// Outcome of a search call. A query before any successful build is an
/// expected condition, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Ranked URLs, closest first. At most `top_k` entries; duplicates
    /// from duplicate source lines are preserved.
    Urls(Vec<String>),
    /// No index is available; see [`NOT_BUILT_MESSAGE`].
    NotBuilt,
}

/// Semantic URL retriever over a sources list.
///
/// Owns the corpus and index for the duration of a build/search
/// sequence; not shared across instances.
pub struct UrlRetriever<E: Embedder> {
    embedder: E,
    config: RetrieverConfig,
    state: IndexState,
    index: Option<FlatIndex>,
    corpus: Vec<SourceLine>,
}

impl<E: Embedder> UrlRetriever<E> {
    pub fn new(embedder: E, config: RetrieverConfig) -> Self {
        Self {
            embedder,
            config,
            state: IndexState::Absent,
            index: None,
            corpus: Vec::new(),
        }
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    /// The lines backing the current index, in vector order.
    pub fn corpus(&self) -> &[SourceLine] {
        &self.corpus
    }

    /// Number of vectors in the current index, 0 when none.
    pub fn indexed_count(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }

    /// Build or reuse the index for `lines`.
    ///
    /// Reuses the persisted index when one exists and `force_rebuild` is
    /// off (subject to the configured [`ReusePolicy`]); otherwise resolves
    /// every line through the content cache, batch-encodes the resolved
    /// texts and builds a fresh index, replacing the persisted file.
    /// The cache is persisted unconditionally after a building pass.
    pub fn build_index(
        &mut self,
        lines: &[SourceLine],
        force_rebuild: bool,
    ) -> Result<BuildReport, RetrieverError> {
        self.build_index_with(lines, force_rebuild, |line| line.derived_text())
    }

    /// `build_index` with an explicit line-to-text resolver. The default
    /// resolver derives text from the line itself; tests instrument this
    /// seam with counters.
    pub fn build_index_with<F>(
        &mut self,
        lines: &[SourceLine],
        force_rebuild: bool,
        mut resolve: F,
    ) -> Result<BuildReport, RetrieverError>
    where
        F: FnMut(&SourceLine) -> Option<String>,
    {
        let storage = IndexStorage::new(self.config.index_path.clone());
        let model_id = self.embedder.model_id_hash();

        if storage.exists() && !force_rebuild {
            match storage.load(&model_id, self.embedder.dimensions()) {
                Ok(persisted) => {
                    let stale = self.config.reuse_policy == ReusePolicy::Strict
                        && persisted.fingerprint != corpus_fingerprint(lines);
                    if stale {
                        log::warn!(
                            "persisted index fingerprint does not match current sources, rebuilding"
                        );
                    } else {
                        log::info!(
                            "reusing persisted index with {} vectors from {:?}",
                            persisted.index.len(),
                            storage.path()
                        );
                        // Corpus is taken verbatim from the caller; under
                        // the default policy it is not reconciled against
                        // the loaded vector count.
                        self.index = Some(persisted.index);
                        self.corpus = lines.to_vec();
                        self.state = IndexState::Loaded;
                        return Ok(BuildReport {
                            reused_index: true,
                            ..BuildReport::default()
                        });
                    }
                }
                Err(
                    err @ (IndexStorageError::ModelMismatch
                    | IndexStorageError::VersionMismatch(..)
                    | IndexStorageError::DimensionMismatch { .. }),
                ) => {
                    log::warn!("persisted index unusable ({err}), rebuilding");
                }
                Err(err) => return Err(err.into()),
            }
        }

        log::info!("building index for {} source lines", lines.len());
        self.state = IndexState::Building;
        self.index = None;
        self.corpus.clear();

        let mut cache = ContentCache::load(self.config.cache_path.clone())?;
        let mut report = BuildReport::default();
        let mut texts: Vec<String> = Vec::with_capacity(lines.len());

        for line in lines {
            let was_cached = !force_rebuild && cache.contains(&line.raw);
            match cache.get_or_resolve(&line.raw, force_rebuild, |_| resolve(line)) {
                Some(text) => {
                    if was_cached {
                        report.from_cache += 1;
                    } else {
                        report.newly_resolved += 1;
                    }
                    report.resolved.push(line.raw.clone());
                    texts.push(text);
                    self.corpus.push(line.clone());
                }
                None => {
                    log::debug!("line resolved to nothing, dropping: {}", line.raw);
                    report.skipped.push(line.raw.clone());
                }
            }
        }

        // Saved even when nothing new resolved.
        cache.save()?;

        if texts.is_empty() {
            log::warn!("no line resolved to usable text, index left unbuilt");
            self.state = IndexState::Empty;
            return Ok(report);
        }

        let vectors = self.embedder.encode(&texts)?;
        let index = FlatIndex::build(self.embedder.dimensions(), self.config.metric, vectors)?;

        let fingerprint = corpus_fingerprint(&self.corpus);
        storage.save(&index, &model_id, &fingerprint)?;
        log::info!(
            "built index with {} vectors, persisted to {:?}",
            index.len(),
            storage.path()
        );

        self.index = Some(index);
        self.state = IndexState::Ready;
        Ok(report)
    }

    /// Run a top-k query against the current index.
    ///
    /// Returns `SearchOutcome::NotBuilt` while no index is available
    /// (never an error for that condition). Otherwise returns up to
    /// `top_k` URLs ranked by ascending distance to the query.
    pub fn search(&self, query: &str, top_k: usize) -> Result<SearchOutcome, RetrieverError> {
        let Some(index) = self.index.as_ref() else {
            return Ok(SearchOutcome::NotBuilt);
        };

        let query_vector = self
            .embedder
            .encode(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::EmbeddingFailed("No embedding returned for query".to_string())
            })?;

        let neighbors = index.search(&query_vector, top_k)?;

        let urls = neighbors
            .iter()
            .filter(|n| n.ordinal != NO_MATCH)
            .filter_map(|n| {
                let line = self.corpus.get(n.ordinal as usize);
                if line.is_none() {
                    // Stale reuse: the loaded index holds more vectors
                    // than the caller supplied lines.
                    log::debug!("ordinal {} has no corpus line, dropping", n.ordinal);
                }
                line
            })
            .map(|line| line.url.clone())
            .collect();

        Ok(SearchOutcome::Urls(urls))
    }
}

/// One-shot entry point: load lines from `source_path`, build or reuse
/// the index, run a single query.
pub fn load_build_search<E: Embedder>(
    retriever: &mut UrlRetriever<E>,
    source_path: &Path,
    query: &str,
    top_k: usize,
    force_rebuild: bool,
) -> Result<SearchOutcome, RetrieverError> {
    let lines = load_source_lines(source_path)?;
    retriever.build_index(&lines, force_rebuild)?;
    retriever.search(query, top_k)
}

/// SHA256 over the corpus cache keys, stored next to the index so strict
/// reuse can detect a changed sources list.
pub fn corpus_fingerprint(lines: &[SourceLine]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.raw.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let lines: Vec<SourceLine> = ["https://a.example Learn math", "https://b.example"]
            .iter()
            .filter_map(|l| SourceLine::parse(l))
            .collect();

        assert_eq!(corpus_fingerprint(&lines), corpus_fingerprint(&lines));
    }

    #[test]
    fn test_fingerprint_changes_with_lines() {
        let a = vec![SourceLine::parse("https://a.example Learn math").unwrap()];
        let b = vec![SourceLine::parse("https://b.example Learn code").unwrap()];
        assert_ne!(corpus_fingerprint(&a), corpus_fingerprint(&b));
        assert_ne!(corpus_fingerprint(&a), corpus_fingerprint(&[]));
    }

    #[test]
    fn test_fingerprint_order_sensitive() {
        let a = SourceLine::parse("https://a.example").unwrap();
        let b = SourceLine::parse("https://b.example").unwrap();
        assert_ne!(
            corpus_fingerprint(&[a.clone(), b.clone()]),
            corpus_fingerprint(&[b, a])
        );
    }
}
