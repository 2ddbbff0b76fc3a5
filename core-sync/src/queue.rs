//! Upload queue and per-item state transitions.
//!
//! The queue is kept sorted by `creation_time` ascending after every merge,
//! so processing order is always oldest first. Every transition that the run
//! loop or a command handler performs goes through a method here; the engine
//! never edits items directly.

use crate::model::{QueueCounts, UploadItem, UploadStatus};
use bridge_traits::media::ScannedAsset;
use std::collections::HashSet;

pub const ONE_DAY_MS: i64 = 86_400_000;
pub const INTERRUPTED_MESSAGE: &str = "Upload was interrupted. Retry the item.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadQueue {
    items: Vec<UploadItem>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from loaded items, restoring sort order.
    ///
    /// Only the first record of a repeated id is kept.
    pub fn from_items(items: Vec<UploadItem>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        let mut queue = Self { items };
        queue.sort();
        queue
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<UploadItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    fn sort(&mut self) {
        // Stable, so items sharing a creation time keep their insertion order.
        self.items.sort_by_key(|item| item.creation_time);
    }

    /// Fold discovered assets into the queue by id.
    ///
    /// Known ids are left untouched; unseen ids become new `pending` items.
    /// Returns the number of items added.
    pub fn merge_discovered(&mut self, assets: Vec<ScannedAsset>) -> usize {
        let mut known: HashSet<String> = self.items.iter().map(|item| item.id.clone()).collect();
        let mut added = 0;

        for asset in assets {
            if !known.insert(asset.id.clone()) {
                continue;
            }
            self.items.push(UploadItem::from_asset(asset));
            added += 1;
        }

        if added > 0 {
            self.sort();
        }
        added
    }

    /// Ids eligible for an upload attempt, oldest first.
    pub fn pending_ids(&self, max_retry_attempts: u32) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.is_eligible(max_retry_attempts))
            .map(|item| item.id.clone())
            .collect()
    }

    /// Move an eligible item into `uploading` and return a snapshot of it.
    ///
    /// Returns `None` when the item vanished or is no longer eligible (for
    /// example after a clear command ran between scheduling and attempt).
    pub fn begin_attempt(
        &mut self,
        id: &str,
        now: i64,
        max_retry_attempts: u32,
    ) -> Option<UploadItem> {
        let item = self.get_mut(id)?;
        if !item.is_eligible(max_retry_attempts) {
            return None;
        }
        item.attempt_count += 1;
        item.status = UploadStatus::Uploading;
        item.progress = 0.0;
        item.error_message = None;
        item.last_attempt_at = Some(now);
        Some(item.clone())
    }

    /// Record transfer progress. Ignored unless the item is uploading and
    /// the new fraction is not lower than the current one.
    pub fn set_progress(&mut self, id: &str, fraction: f64) -> bool {
        let Some(item) = self.get_mut(id) else {
            return false;
        };
        if item.status != UploadStatus::Uploading || !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < item.progress {
            return false;
        }
        item.progress = fraction;
        true
    }

    pub fn mark_completed(&mut self, id: &str, now: i64) -> bool {
        let Some(item) = self.get_mut(id) else {
            return false;
        };
        item.status = UploadStatus::Completed;
        item.progress = 1.0;
        item.error_message = None;
        item.uploaded_at = Some(now);
        true
    }

    pub fn mark_failed(&mut self, id: &str, message: impl Into<String>) -> bool {
        let Some(item) = self.get_mut(id) else {
            return false;
        };
        item.status = UploadStatus::Failed;
        item.error_message = Some(message.into());
        true
    }

    /// Move one failed item back to `pending` if its budget allows.
    pub fn retry_item(&mut self, id: &str, max_retry_attempts: u32) -> bool {
        match self.get_mut(id) {
            Some(item) => reset_for_retry(item, max_retry_attempts),
            None => false,
        }
    }

    /// Move every retryable failed item back to `pending`.
    pub fn retry_all_failed(&mut self, max_retry_attempts: u32) -> usize {
        self.items
            .iter_mut()
            .map(|item| reset_for_retry(item, max_retry_attempts))
            .filter(|&moved| moved)
            .count()
    }

    pub fn clear_completed(&mut self) -> usize {
        self.remove_where(|item| item.status == UploadStatus::Completed)
    }

    pub fn clear_failed(&mut self) -> usize {
        self.remove_where(|item| item.status == UploadStatus::Failed)
    }

    /// Drop every item not currently uploading.
    pub fn clear_all(&mut self) -> usize {
        self.remove_where(|item| item.status != UploadStatus::Uploading)
    }

    /// Remove completed items older than `days` relative to `now`.
    ///
    /// Age is measured from `uploaded_at`, or `creation_time` when absent.
    /// A zero threshold disables the cleanup.
    pub fn cleanup_completed(&mut self, days: u32, now: i64) -> usize {
        if days == 0 {
            return 0;
        }
        let threshold = now - i64::from(days) * ONE_DAY_MS;
        self.remove_where(|item| {
            item.status == UploadStatus::Completed
                && item.uploaded_at.unwrap_or(item.creation_time) < threshold
        })
    }

    /// Turn leftover `uploading` items into failures.
    ///
    /// An item can only be `uploading` here if the previous run never
    /// reached its exit path. Returns the number of items changed.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.status == UploadStatus::Uploading)
        {
            mark_interrupted(item);
            recovered += 1;
        }
        recovered
    }

    /// Fail a single item left `uploading`. Returns whether it changed.
    pub fn recover_item(&mut self, id: &str) -> bool {
        match self.get_mut(id) {
            Some(item) if item.status == UploadStatus::Uploading => {
                mark_interrupted(item);
                true
            }
            _ => false,
        }
    }

    pub fn counts(&self) -> QueueCounts {
        self.items
            .iter()
            .fold(QueueCounts::default(), |mut counts, item| {
                match item.status {
                    UploadStatus::Pending => counts.pending += 1,
                    UploadStatus::Uploading => counts.uploading += 1,
                    UploadStatus::Completed => counts.completed += 1,
                    UploadStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    pub fn has_failures(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.status == UploadStatus::Failed)
    }

    fn remove_where(&mut self, predicate: impl Fn(&UploadItem) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !predicate(item));
        before - self.items.len()
    }
}

fn mark_interrupted(item: &mut UploadItem) {
    item.status = UploadStatus::Failed;
    if item.error_message.is_none() {
        item.error_message = Some(INTERRUPTED_MESSAGE.to_string());
    }
}

fn reset_for_retry(item: &mut UploadItem, max_retry_attempts: u32) -> bool {
    if item.status != UploadStatus::Failed || item.attempt_count >= max_retry_attempts {
        return false;
    }
    item.status = UploadStatus::Pending;
    item.progress = 0.0;
    item.error_message = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::media::MediaType;

    fn asset(id: &str, creation_time: i64) -> ScannedAsset {
        ScannedAsset {
            id: id.to_string(),
            filename: format!("{id}.jpg"),
            local_location: format!("/dcim/{id}.jpg"),
            media_type: MediaType::Photo,
            creation_time,
        }
    }

    #[test]
    fn test_merge_is_idempotent_and_sorted() {
        let mut queue = UploadQueue::new();
        assert_eq!(queue.merge_discovered(vec![asset("b", 20), asset("a", 10)]), 2);
        let snapshot = queue.clone();

        assert_eq!(queue.merge_discovered(vec![asset("a", 10), asset("b", 20)]), 0);
        assert_eq!(queue, snapshot);
        assert_eq!(queue.items()[0].id, "a");
    }

    #[test]
    fn test_merge_keeps_existing_state_and_dedupes_batch() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 10)]);
        queue.begin_attempt("a", 100, 3);
        queue.mark_failed("a", "boom");

        let added = queue.merge_discovered(vec![asset("a", 10), asset("c", 5), asset("c", 5)]);
        assert_eq!(added, 1);
        assert_eq!(queue.len(), 2);

        let a = queue.get("a").unwrap();
        assert_eq!(a.status, UploadStatus::Failed);
        assert_eq!(a.attempt_count, 1);
    }

    #[test]
    fn test_attempt_lifecycle() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 10)]);

        let item = queue.begin_attempt("a", 500, 3).unwrap();
        assert_eq!(item.status, UploadStatus::Uploading);
        assert_eq!(item.attempt_count, 1);
        assert_eq!(item.last_attempt_at, Some(500));

        assert!(queue.set_progress("a", 0.5));
        assert!(!queue.set_progress("a", 0.25));
        assert_eq!(queue.get("a").unwrap().progress, 0.5);

        queue.mark_completed("a", 900);
        let item = queue.get("a").unwrap();
        assert_eq!(item.progress, 1.0);
        assert_eq!(item.uploaded_at, Some(900));
        assert!(!queue.set_progress("a", 0.9));
        assert!(queue.begin_attempt("a", 1000, 3).is_none());
    }

    #[test]
    fn test_retry_never_resets_attempts_and_respects_budget() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 10), asset("b", 20)]);

        for _ in 0..3 {
            queue.begin_attempt("a", 1, 3);
            queue.mark_failed("a", "nope");
        }
        queue.begin_attempt("b", 1, 3);
        queue.mark_failed("b", "nope");

        assert!(!queue.retry_item("a", 3));
        assert_eq!(queue.retry_all_failed(3), 1);

        let a = queue.get("a").unwrap();
        assert_eq!(a.status, UploadStatus::Failed);
        assert_eq!(a.attempt_count, 3);

        let b = queue.get("b").unwrap();
        assert_eq!(b.status, UploadStatus::Pending);
        assert_eq!(b.attempt_count, 1);
        assert!(b.error_message.is_none());
        assert_eq!(queue.pending_ids(3), vec!["b".to_string()]);
    }

    #[test]
    fn test_cleanup_completed_by_age() {
        let now = 100 * ONE_DAY_MS;
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("old", 1), asset("fresh", 2), asset("legacy", 3)]);

        queue.begin_attempt("old", 0, 3);
        queue.mark_completed("old", now - 8 * ONE_DAY_MS);
        queue.begin_attempt("fresh", 0, 3);
        queue.mark_completed("fresh", now - ONE_DAY_MS);
        queue.begin_attempt("legacy", 0, 3);
        queue.mark_completed("legacy", 0);
        queue.items.iter_mut().for_each(|item| {
            if item.id == "legacy" {
                item.uploaded_at = None;
            }
        });

        assert_eq!(queue.cleanup_completed(0, now), 0);
        assert_eq!(queue.cleanup_completed(7, now), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items()[0].id, "fresh");
    }

    #[test]
    fn test_clear_all_spares_uploading() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 1), asset("b", 2)]);
        queue.begin_attempt("a", 0, 3);

        assert_eq!(queue.clear_all(), 1);
        assert_eq!(queue.items()[0].id, "a");
    }

    #[test]
    fn test_recover_interrupted_only_touches_uploading() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 1), asset("b", 2), asset("c", 3)]);
        queue.begin_attempt("a", 0, 3);
        queue.begin_attempt("b", 0, 3);
        queue.mark_failed("b", "disk full");
        queue.items[1].status = UploadStatus::Uploading;

        assert_eq!(queue.recover_interrupted(), 2);
        assert_eq!(
            queue.get("a").unwrap().error_message.as_deref(),
            Some(INTERRUPTED_MESSAGE)
        );
        assert_eq!(queue.get("b").unwrap().error_message.as_deref(), Some("disk full"));
        assert_eq!(queue.get("c").unwrap().status, UploadStatus::Pending);
        assert_eq!(queue.counts().failed, 2);
    }

    #[test]
    fn test_recover_item_targets_one_upload() {
        let mut queue = UploadQueue::new();
        queue.merge_discovered(vec![asset("a", 1), asset("b", 2)]);
        queue.begin_attempt("a", 0, 3);

        assert!(!queue.recover_item("b"));
        assert!(queue.recover_item("a"));
        assert!(!queue.recover_item("a"));

        let a = queue.get("a").unwrap();
        assert_eq!(a.status, UploadStatus::Failed);
        assert_eq!(a.attempt_count, 1);
        assert_eq!(a.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert!(queue.retry_item("a", 3));
    }

    #[test]
    fn test_from_items_keeps_first_of_duplicate_ids() {
        let mut first = UploadItem::from_asset(asset("a", 10));
        first.status = UploadStatus::Completed;
        let duplicate = UploadItem::from_asset(asset("a", 5));
        let other = UploadItem::from_asset(asset("b", 1));

        let queue = UploadQueue::from_items(vec![first, duplicate, other]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.items()[0].id, "b");
        let a = queue.get("a").unwrap();
        assert_eq!(a.status, UploadStatus::Completed);
        assert_eq!(a.creation_time, 10);
    }
}
