pub mod analyze;
pub mod config;
pub mod init;
pub mod merge_request;
pub mod story;

use anyhow::Context as _;
use std::path::Path;
use storyforest_core::{config::Config, StoryStore, YamlFilePort};

/// Global flags every subcommand sees.
pub struct Context<'a> {
    pub root: &'a Path,
    pub json: bool,
    pub depth_limit: Option<u32>,
}

impl Context<'_> {
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = Config::load(self.root).with_context(|| {
            format!(
                "no story forest at {} (run `storyforest init`)",
                self.root.display()
            )
        })?;
        Ok(config.with_depth_limit(self.depth_limit))
    }

    pub fn open_store(&self) -> anyhow::Result<StoryStore> {
        let config = self.config()?;
        let port = YamlFilePort::new(self.root);
        StoryStore::open(Box::new(port), &config).context("failed to open story forest")
    }
}

/// Split a comma-separated id list, dropping blanks.
pub fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ids_trims_and_skips_blanks() {
        assert_eq!(split_ids(" a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_ids("").is_empty());
    }
}
