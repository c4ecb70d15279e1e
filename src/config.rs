use crate::retriever::{DistanceMetric, RetrieverConfig, ReusePolicy, DEFAULT_MODEL};
use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cache file name inside the base directory
const DEFAULT_CACHE_FILE: &str = "cache.json";
/// Default index file name inside the base directory
const DEFAULT_INDEX_FILE: &str = "index.bin";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Distance metric for the index: "l2" or "cosine"
    #[serde(default)]
    pub distance_metric: DistanceMetric,

    /// Index reuse policy: "reuse" (load verbatim) or "strict"
    /// (rebuild when the sources fingerprint changed)
    #[serde(default)]
    pub reuse_policy: ReusePolicy,

    /// Cache file name, relative to the base directory
    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    /// Index file name, relative to the base directory
    #[serde(default = "default_index_file")]
    pub index_file: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            distance_metric: DistanceMetric::default(),
            reuse_policy: ReusePolicy::default(),
            cache_file: DEFAULT_CACHE_FILE.to_string(),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            base_path: String::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

fn default_index_file() -> String {
    DEFAULT_INDEX_FILE.to_string()
}

impl Config {
    fn validate(&self) {
        if self.model.trim().is_empty() {
            panic!("model must not be empty");
        }

        if self.cache_file.trim().is_empty() || self.index_file.trim().is_empty() {
            panic!("cache_file and index_file must not be empty");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("couldnt create base directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("couldnt write default config");
        }

        let config_str =
            String::from_utf8(store.read("config.yaml").expect("couldnt read config file"))
                .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("couldnt create base directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("couldnt write config file");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join(&self.cache_file)
    }

    pub fn index_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join(&self.index_file)
    }

    /// The explicit per-instance configuration handed to the retriever.
    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            cache_path: self.cache_path(),
            index_path: self.index_path(),
            metric: self.distance_metric,
            reuse_policy: self.reuse_policy,
        }
    }
}
