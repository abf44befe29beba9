use std::collections::HashSet;
use tracing::debug;

use crate::crawler::task::ContentRef;

/// Decides which refs of a category still need fetching
pub struct Scheduler {
    /// Ids that already have a record on disk
    fetched_ids: HashSet<String>,

    /// Ids scheduled so far in this pass
    seen_ids: HashSet<String>,
}

impl Scheduler {
    /// Create a scheduler that skips everything in `fetched_ids`
    pub fn new(fetched_ids: HashSet<String>) -> Self {
        Self {
            fetched_ids,
            seen_ids: HashSet::new(),
        }
    }

    /// Determine if a ref should be fetched; the first ref for an id wins
    pub fn should_crawl(&mut self, content: &ContentRef) -> bool {
        if self.fetched_ids.contains(&content.id) {
            debug!("Skipping already fetched note: {}", content.id);
            return false;
        }

        if content.access_token.is_empty() {
            debug!("Skipping note without access token: {}", content.id);
            return false;
        }

        if !self.seen_ids.insert(content.id.clone()) {
            debug!("Skipping duplicate note: {}", content.id);
            return false;
        }

        true
    }

    /// Build the pending set from merged manifest refs, preserving order
    pub fn pending<I>(&mut self, refs: I) -> Vec<ContentRef>
    where
        I: IntoIterator<Item = ContentRef>,
    {
        refs.into_iter()
            .filter(|content| self.should_crawl(content))
            .collect()
    }

    pub fn fetched_count(&self) -> usize {
        self.fetched_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
    const ID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbb";
    const ID_C: &str = "cccccccccccccccccccccccc";

    #[test]
    fn test_should_crawl() {
        let fetched = HashSet::from([ID_C.to_string()]);
        let mut scheduler = Scheduler::new(fetched);

        assert!(scheduler.should_crawl(&ContentRef::new(ID_A, "t1")));

        // Same id again, different token
        assert!(!scheduler.should_crawl(&ContentRef::new(ID_A, "t2")));

        // Already on disk
        assert!(!scheduler.should_crawl(&ContentRef::new(ID_C, "t3")));

        // No token
        assert!(!scheduler.should_crawl(&ContentRef::new(ID_B, "")));
        assert!(scheduler.should_crawl(&ContentRef::new(ID_B, "t4")));
    }

    #[test]
    fn test_pending_is_difference_first_wins() {
        let fetched = HashSet::from([ID_B.to_string()]);
        let mut scheduler = Scheduler::new(fetched);

        let pending = scheduler.pending(vec![
            ContentRef::new(ID_A, "first"),
            ContentRef::new(ID_B, "done"),
            ContentRef::new(ID_C, "c"),
            ContentRef::new(ID_A, "second"),
        ]);

        assert_eq!(pending, vec![
            ContentRef::new(ID_A, "first"),
            ContentRef::new(ID_C, "c"),
        ]);
        assert_eq!(scheduler.fetched_count(), 1);
    }
}
