//! Semantic retrieval index over a sources list.
//!
//! This module turns `"url [description]"` lines into a searchable
//! vector index and answers top-k nearest-neighbor queries against it.
//!
//! # Architecture
//!
//! - `cache`: persistent line → derived-text cache (cache.json)
//! - `embeddings`: `Embedder` seam plus the fastembed implementation
//! - `index`: exact flat nearest-neighbor index, L2 or cosine
//! - `storage`: binary file I/O for index.bin persistence
//! - `service`: the retrieval orchestrator tying it all together

pub mod cache;
pub mod embeddings;
mod index;
mod service;
mod storage;

pub use cache::{CacheError, ContentCache};
pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use index::{DistanceMetric, FlatIndex, IndexError, Neighbor, NO_MATCH};
pub use service::{
    corpus_fingerprint, load_build_search, BuildReport, IndexState, RetrieverConfig,
    RetrieverError, ReusePolicy, SearchOutcome, UrlRetriever, NOT_BUILT_MESSAGE,
};
pub use storage::{IndexStorage, IndexStorageError, PersistedIndex};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
