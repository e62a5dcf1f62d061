//! Persistence port for the forest.
//!
//! The store never writes storage directly: it hands a fully validated next
//! snapshot to [`ForestPort::commit`] together with the version it was built
//! from, and the port refuses the write if someone else got there first.

use crate::error::Result;
use crate::forest::Forest;
use crate::io;
use crate::paths;
use crate::types::StoryStatus;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// What a commit changed. Ports may journal it; the snapshot is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateMergeRequest { id: String },
    UpdateMergeRequest { id: String },
    DeleteMergeRequest { id: String, stories: usize, tests: usize },
    CreateStory { id: String, parent_id: Option<String> },
    UpdateStory { id: String },
    MoveStory { id: String, parent_id: Option<String>, index: usize },
    ReorderChildren { parent: String },
    DeleteStory { id: String, stories: usize, tests: usize },
    ChangeStatus {
        id: String,
        from: StoryStatus,
        to: StoryStatus,
        warnings_accepted: bool,
    },
    AddTest { id: String, story_id: String },
    UpdateTest { id: String },
    DeleteTest { id: String, story_id: String },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::CreateMergeRequest { id } => write!(f, "create-merge-request {id}"),
            Mutation::UpdateMergeRequest { id } => write!(f, "update-merge-request {id}"),
            Mutation::DeleteMergeRequest { id, stories, tests } => {
                write!(f, "delete-merge-request {id} stories={stories} tests={tests}")
            }
            Mutation::CreateStory { id, parent_id } => write!(
                f,
                "create-story {id} parent={}",
                parent_id.as_deref().unwrap_or("-")
            ),
            Mutation::UpdateStory { id } => write!(f, "update-story {id}"),
            Mutation::MoveStory {
                id,
                parent_id,
                index,
            } => write!(
                f,
                "move-story {id} parent={} index={index}",
                parent_id.as_deref().unwrap_or("-")
            ),
            Mutation::ReorderChildren { parent } => write!(f, "reorder-children {parent}"),
            Mutation::DeleteStory { id, stories, tests } => {
                write!(f, "delete-story {id} stories={stories} tests={tests}")
            }
            Mutation::ChangeStatus {
                id,
                from,
                to,
                warnings_accepted,
            } => {
                write!(f, "change-status {id} {from}->{to}")?;
                if *warnings_accepted {
                    f.write_str(" warnings-accepted")?;
                }
                Ok(())
            }
            Mutation::AddTest { id, story_id } => write!(f, "add-test {id} story={story_id}"),
            Mutation::UpdateTest { id } => write!(f, "update-test {id}"),
            Mutation::DeleteTest { id, story_id } => {
                write!(f, "delete-test {id} story={story_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Storage holds a different version than the one the change was built on.
    Conflict { current_version: u64 },
}

// ---------------------------------------------------------------------------
// ForestPort
// ---------------------------------------------------------------------------

pub trait ForestPort: Send + Sync {
    fn load(&self) -> Result<Forest>;

    /// Persist `next` if storage is still at `expected_version`.
    fn commit(&self, mutation: &Mutation, next: &Forest, expected_version: u64)
        -> Result<CommitOutcome>;
}

impl<P: ForestPort + ?Sized> ForestPort for Arc<P> {
    fn load(&self) -> Result<Forest> {
        (**self).load()
    }

    fn commit(
        &self,
        mutation: &Mutation,
        next: &Forest,
        expected_version: u64,
    ) -> Result<CommitOutcome> {
        (**self).commit(mutation, next, expected_version)
    }
}

// ---------------------------------------------------------------------------
// InMemoryPort
// ---------------------------------------------------------------------------

/// Keeps the committed snapshot in memory. Share one behind an `Arc` to give
/// several stores the same backing forest.
#[derive(Debug, Default)]
pub struct InMemoryPort {
    committed: Mutex<Forest>,
    journal: Mutex<Vec<String>>,
}

impl InMemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forest(forest: Forest) -> Self {
        Self {
            committed: Mutex::new(forest),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Committed mutations, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ForestPort for InMemoryPort {
    fn load(&self) -> Result<Forest> {
        Ok(self
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn commit(
        &self,
        mutation: &Mutation,
        next: &Forest,
        expected_version: u64,
    ) -> Result<CommitOutcome> {
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        if committed.version != expected_version {
            return Ok(CommitOutcome::Conflict {
                current_version: committed.version,
            });
        }
        *committed = next.clone();
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mutation.to_string());
        Ok(CommitOutcome::Committed)
    }
}

// ---------------------------------------------------------------------------
// YamlFilePort
// ---------------------------------------------------------------------------

/// Stores the forest as `.storyforest/forest.yaml` under a project root and
/// appends every committed mutation to `.storyforest/journal.log`.
#[derive(Debug)]
pub struct YamlFilePort {
    root: PathBuf,
    // Serializes commits from this process; other processes are caught by the
    // version check.
    write_lock: Mutex<()>,
}

impl YamlFilePort {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self) -> Result<Forest> {
        let path = paths::forest_path(&self.root);
        if !path.exists() {
            return Ok(Forest::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Forest::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }
}

impl ForestPort for YamlFilePort {
    fn load(&self) -> Result<Forest> {
        self.read()
    }

    fn commit(
        &self,
        mutation: &Mutation,
        next: &Forest,
        expected_version: u64,
    ) -> Result<CommitOutcome> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let on_disk = self.read()?.version;
        if on_disk != expected_version {
            return Ok(CommitOutcome::Conflict {
                current_version: on_disk,
            });
        }
        let data = serde_yaml::to_string(next)?;
        io::atomic_write(&paths::forest_path(&self.root), data.as_bytes())?;
        io::append_line(
            &paths::journal_path(&self.root),
            &format!("{} v{} {mutation}", Utc::now().to_rfc3339(), next.version),
        )?;
        Ok(CommitOutcome::Committed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
