//! Source list loading and per-line text derivation.
//!
//! A sources file is newline-delimited UTF-8, one entry per line:
//! `"<url>"` or `"<url> <description words>"`. Blank lines are skipped.
//! The outer-stripped line is the identity of an entry and the key into
//! the content cache.

use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("sources file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),
}

/// One entry from a sources file.
///
/// `raw` is the line after outer whitespace stripping and is the cache
/// key. Internal whitespace is preserved in `raw` but collapsed when the
/// description is reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub raw: String,
    pub url: String,
    pub description: String,
}

impl SourceLine {
    /// Parse a single line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let raw = line.trim();
        if raw.is_empty() {
            return None;
        }

        let mut tokens = raw.split_whitespace();
        let url = tokens.next()?.to_string();
        let description = tokens.collect::<Vec<_>>().join(" ");

        Some(SourceLine {
            raw: raw.to_string(),
            url,
            description,
        })
    }

    /// The text that gets embedded for this line: `"{description}: {url}"`,
    /// or just the url when there is no description.
    pub fn derived_text(&self) -> Option<String> {
        if self.url.is_empty() {
            return None;
        }

        if self.description.is_empty() {
            Some(self.url.clone())
        } else {
            Some(format!("{}: {}", self.description, self.url))
        }
    }
}

/// Load all non-blank lines from a sources file.
///
/// A missing file is a fatal precondition, not an empty list.
pub fn load_source_lines(path: &Path) -> Result<Vec<SourceLine>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().filter_map(SourceLine::parse).collect())
}
