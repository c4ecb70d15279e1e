use std::path::{Path, PathBuf};

use clap::Parser;
use homedir::my_home;

mod cli;
mod config;
mod retriever;
mod sources;
mod storage;

use config::Config;
use retriever::{
    load_build_search, ContentCache, EmbeddingModel, SearchOutcome, UrlRetriever,
    NOT_BUILT_MESSAGE,
};

fn default_base_path() -> String {
    format!(
        "{}/.config/urlindex",
        my_home()
            .expect("couldnt resolve home dir")
            .expect("no home dir for current user")
            .to_string_lossy()
    )
}

fn create_retriever(config: &Config) -> anyhow::Result<UrlRetriever<EmbeddingModel>> {
    let model = EmbeddingModel::new(&config.model, PathBuf::from(config.base_path()))?;
    Ok(UrlRetriever::new(model, config.retriever_config()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();

    let base_path = args.config_dir.unwrap_or_else(default_base_path);
    let config = Config::load_with(&base_path);

    match args.command {
        cli::Command::Build {
            sources,
            force_rebuild,
        } => {
            let lines = sources::load_source_lines(Path::new(&sources))?;
            let mut retriever = create_retriever(&config)?;
            let report = retriever.build_index(&lines, force_rebuild)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        cli::Command::Search {
            query,
            sources,
            top_k,
            force_rebuild,
        } => {
            let mut retriever = create_retriever(&config)?;
            let outcome = load_build_search(
                &mut retriever,
                Path::new(&sources),
                &query,
                top_k,
                force_rebuild,
            )?;

            match outcome {
                SearchOutcome::Urls(urls) => {
                    println!("{}", serde_json::to_string_pretty(&urls)?)
                }
                SearchOutcome::NotBuilt => println!("{NOT_BUILT_MESSAGE}"),
            }
            Ok(())
        }

        cli::Command::Status {} => {
            let cache = ContentCache::load(config.cache_path())?;
            let status = serde_json::json!({
                "cache_file": config.cache_path().display().to_string(),
                "cache_entries": cache.len(),
                "index_file": config.index_path().display().to_string(),
                "index_present": config.index_path().exists(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}
