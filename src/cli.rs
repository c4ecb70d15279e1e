use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base directory for config.yaml, cache.json and index.bin.
    /// Defaults to ~/.config/urlindex
    #[clap(long)]
    pub config_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build or refresh the index from a sources file
    Build {
        /// Path to the sources file (one "url [description]" per line)
        #[clap(short, long)]
        sources: String,

        /// Ignore the cache and any persisted index, rebuild everything
        #[clap(short, long, default_value = "false")]
        force_rebuild: bool,
    },

    /// Query for the most relevant URLs, building or reusing the index first
    Search {
        /// The search query
        query: String,

        /// Path to the sources file (one "url [description]" per line)
        #[clap(short, long)]
        sources: String,

        /// Number of URLs to return
        #[clap(short = 'k', long, default_value = "3")]
        top_k: usize,

        /// Ignore the cache and any persisted index, rebuild everything
        #[clap(short, long, default_value = "false")]
        force_rebuild: bool,
    },

    /// Show cache and index file status
    Status {},
}
