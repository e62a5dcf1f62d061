use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STORYFOREST_DIR: &str = ".storyforest";
pub const CONFIG_FILE: &str = ".storyforest/config.yaml";
pub const FOREST_FILE: &str = ".storyforest/forest.yaml";
pub const JOURNAL_FILE: &str = ".storyforest/journal.log";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn storyforest_dir(root: &Path) -> PathBuf {
    root.join(STORYFOREST_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn forest_path(root: &Path) -> PathBuf {
    root.join(FOREST_FILE)
}

pub fn journal_path(root: &Path) -> PathBuf {
    root.join(JOURNAL_FILE)
}

pub fn is_initialized(root: &Path) -> bool {
    config_path(root).exists()
}
