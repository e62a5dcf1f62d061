use crate::types::IdKind;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Hands out `<prefix>-<uuid>` identifiers and remembers every id it has
/// issued or been told about, so a value is never returned twice.
#[derive(Debug, Default)]
pub struct IdAllocator {
    issued: Mutex<HashSet<String>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark ids that already exist (e.g. loaded from disk) as taken.
    pub fn reserve<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        issued.extend(ids.into_iter().map(Into::into));
    }

    pub fn allocate(&self, kind: IdKind) -> String {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let candidate = format!("{}-{}", kind.prefix(), Uuid::new_v4().simple());
            if issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_kind_prefix() {
        let ids = IdAllocator::new();
        assert!(ids.allocate(IdKind::MergeRequest).starts_with("mr-"));
        assert!(ids.allocate(IdKind::Story).starts_with("story-"));
        assert!(ids.allocate(IdKind::AcceptanceTest).starts_with("test-"));
    }

    #[test]
    fn ids_never_repeat() {
        let ids = IdAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(ids.allocate(IdKind::Story)));
        }
    }

    #[test]
    fn reserved_ids_are_tracked() {
        let ids = IdAllocator::new();
        ids.reserve(["story-legacy"]);
        let issued = ids.issued.lock().unwrap();
        assert!(issued.contains("story-legacy"));
        assert!(!issued.contains("story-other"));
    }
}
