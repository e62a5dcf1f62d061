pub mod acceptance;
pub mod config;
pub mod error;
pub mod forest;
pub mod gate;
pub mod hierarchy;
pub mod id;
pub mod io;
pub mod merge_request;
pub mod paths;
pub mod port;
pub mod quality;
pub mod store;
pub mod story;
pub mod tree;
pub mod types;

pub use error::{HierarchyError, Result, StoryError};
pub use port::{ForestPort, InMemoryPort, YamlFilePort};
pub use store::{DeletionSummary, StoryStore};
