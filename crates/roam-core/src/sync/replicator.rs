//! Generic push/pull replicator shared by all entity types

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::remote::GatewayResult;

use super::record::{EntityKind, SyncRecord};
use super::{PhaseOutcome, SyncOutcome};

/// Local-store side of the replication seam, implemented by the entity
/// repositories
#[async_trait]
pub trait SyncStore<R: SyncRecord>: Send + Sync {
    /// Records that still need to reach the remote store, oldest first
    async fn select_unsynced(&self) -> Result<Vec<R>>;

    /// Flag exactly the given ids as replicated
    async fn mark_synced_batch(&self, ids: &[String]) -> Result<()>;

    /// Land pulled remote records locally. Implementations store them as
    /// already synced; a record arriving on this path is the remote truth.
    async fn apply_remote_batch(&self, records: &[R]) -> Result<()>;
}

/// Remote side of the replication seam. Uploads are upserts keyed by
/// record id, so redelivering the same record is harmless.
#[async_trait]
pub trait SyncGateway<R: SyncRecord>: Send + Sync {
    /// Upsert one record into its collection
    async fn upload(&self, record: &R) -> GatewayResult<()>;

    /// Upsert a batch of records into its collection
    async fn upload_batch(&self, records: &[R]) -> GatewayResult<()>;

    /// Delete the document with the given id; absent documents are fine
    async fn delete(&self, id: &str) -> GatewayResult<()>;

    /// Fetch every document belonging to `owner_key`
    async fn query_by_owner(&self, owner_key: &str) -> GatewayResult<Vec<R>>;

    /// Fetch the most recently created documents, newest first
    async fn query_recent(&self, limit: usize) -> GatewayResult<Vec<R>>;
}

/// Replicates one entity type between the local store and its remote
/// collection.
///
/// A cycle always pushes first, so a pull in the same cycle sees the
/// remote store after local changes landed. The pull phase runs even when
/// the push failed; stale local flags survive either way.
pub struct Replicator<R: SyncRecord> {
    store: Arc<dyn SyncStore<R>>,
    gateway: Arc<dyn SyncGateway<R>>,
    pull_limit: Option<usize>,
}

impl<R: SyncRecord> Replicator<R> {
    /// Create a push-only replicator
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore<R>>, gateway: Arc<dyn SyncGateway<R>>) -> Self {
        Self {
            store,
            gateway,
            pull_limit: None,
        }
    }

    /// Enable the pull phase, fetching up to `limit` recent remote records
    /// after each push
    #[must_use]
    pub fn with_pull(mut self, limit: usize) -> Self {
        self.pull_limit = Some(limit);
        self
    }

    /// Run one full cycle and report what happened per phase
    pub async fn run_sync(&self) -> SyncOutcome {
        let entity = R::KIND;
        tracing::debug!("Starting {entity} sync cycle");

        let push = self.push_phase().await;
        let pull = match self.pull_limit {
            Some(limit) => Some(self.pull_phase(limit).await),
            None => None,
        };

        SyncOutcome { entity, push, pull }
    }

    async fn push_phase(&self) -> PhaseOutcome {
        let entity = R::KIND;
        let pending = match self.store.select_unsynced().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!("Could not read unsynced {entity} records: {error}");
                return PhaseOutcome::Failed {
                    reason: error.to_string(),
                };
            }
        };

        if pending.is_empty() {
            return PhaseOutcome::Skipped;
        }

        if let Err(error) = self.gateway.upload_batch(&pending).await {
            tracing::warn!(
                "Push of {} {entity} record(s) failed: {error}",
                pending.len()
            );
            return PhaseOutcome::Failed {
                reason: error.to_string(),
            };
        }

        // Mark exactly what was submitted; records created after the
        // selection stay unsynced for the next cycle
        let ids: Vec<String> = pending.iter().map(SyncRecord::record_id).collect();
        match self.store.mark_synced_batch(&ids).await {
            Ok(()) => {
                tracing::debug!("Pushed {} {entity} record(s)", ids.len());
                PhaseOutcome::Completed {
                    records: ids.len(),
                }
            }
            Err(error) => {
                // The upload already landed; the records stay flagged and
                // will be re-upserted onto the same document ids next cycle
                tracing::warn!("Could not mark {entity} records synced: {error}");
                PhaseOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }

    async fn pull_phase(&self, limit: usize) -> PhaseOutcome {
        let entity = R::KIND;
        let records = match self.gateway.query_recent(limit).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!("Pull of recent {entity} records failed: {error}");
                return PhaseOutcome::Failed {
                    reason: error.to_string(),
                };
            }
        };

        if records.is_empty() {
            return PhaseOutcome::Skipped;
        }

        match self.store.apply_remote_batch(&records).await {
            Ok(()) => {
                tracing::debug!("Pulled {} {entity} record(s)", records.len());
                PhaseOutcome::Completed {
                    records: records.len(),
                }
            }
            Err(error) => {
                tracing::warn!("Could not apply pulled {entity} records: {error}");
                PhaseOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }
}

/// Object-safe view of a replicator; what the scheduler and service hold
#[async_trait]
pub trait Replicate: Send + Sync {
    /// Entity this replicator serves
    fn entity(&self) -> EntityKind;

    /// Run one push (and optional pull) cycle
    async fn run_sync(&self) -> SyncOutcome;
}

#[async_trait]
impl<R: SyncRecord> Replicate for Replicator<R> {
    fn entity(&self) -> EntityKind {
        R::KIND
    }

    async fn run_sync(&self) -> SyncOutcome {
        Self::run_sync(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use crate::db::{Database, ReviewRepository};
    use crate::error::Error;
    use crate::models::{Favorite, Review};
    use crate::remote::GatewayError;

    use super::*;

    type EventLog = Arc<Mutex<Vec<&'static str>>>;

    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<Favorite>>,
        fail_select: Mutex<bool>,
        fail_mark: Mutex<bool>,
        events: EventLog,
    }

    impl FakeStore {
        fn insert_unsynced(&self, mut favorite: Favorite) {
            favorite.synced = false;
            self.rows.lock().unwrap().push(favorite);
        }

        fn insert_synced(&self, mut favorite: Favorite) {
            favorite.synced = true;
            self.rows.lock().unwrap().push(favorite);
        }

        fn unsynced_count(&self) -> usize {
            self.rows.lock().unwrap().iter().filter(|row| !row.synced).count()
        }

        fn row(&self, id: &str) -> Option<Favorite> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|row| row.id.as_str() == id)
                .cloned()
        }
    }

    #[async_trait]
    impl SyncStore<Favorite> for FakeStore {
        async fn select_unsynced(&self) -> Result<Vec<Favorite>> {
            self.events.lock().unwrap().push("select");
            if *self.fail_select.lock().unwrap() {
                return Err(Error::Database("select blew up".to_string()));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| !row.synced)
                .cloned()
                .collect())
        }

        async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
            self.events.lock().unwrap().push("mark");
            if *self.fail_mark.lock().unwrap() {
                return Err(Error::Database("mark blew up".to_string()));
            }
            for row in self.rows.lock().unwrap().iter_mut() {
                if ids.contains(&row.id.as_str()) {
                    row.synced = true;
                }
            }
            Ok(())
        }

        async fn apply_remote_batch(&self, records: &[Favorite]) -> Result<()> {
            self.events.lock().unwrap().push("apply");
            let mut rows = self.rows.lock().unwrap();
            for record in records {
                let mut incoming = record.clone();
                incoming.synced = true;
                if let Some(existing) = rows.iter_mut().find(|row| row.id == incoming.id) {
                    *existing = incoming;
                } else {
                    rows.push(incoming);
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        docs: Mutex<HashMap<String, Favorite>>,
        seeded_recent: Mutex<Vec<Favorite>>,
        fail_uploads: Mutex<u32>,
        fail_query: Mutex<bool>,
        upload_batches: Mutex<u32>,
        events: EventLog,
    }

    impl FakeGateway {
        fn doc_count(&self) -> usize {
            self.docs.lock().unwrap().len()
        }

        fn upload_batch_calls(&self) -> u32 {
            *self.upload_batches.lock().unwrap()
        }
    }

    #[async_trait]
    impl SyncGateway<Favorite> for FakeGateway {
        async fn upload(&self, record: &Favorite) -> GatewayResult<()> {
            self.docs
                .lock()
                .unwrap()
                .insert(record.record_id(), record.clone());
            Ok(())
        }

        async fn upload_batch(&self, records: &[Favorite]) -> GatewayResult<()> {
            self.events.lock().unwrap().push("upload");
            *self.upload_batches.lock().unwrap() += 1;
            {
                let mut failures = self.fail_uploads.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(GatewayError::Api("batch rejected (503)".to_string()));
                }
            }
            let mut docs = self.docs.lock().unwrap();
            for record in records {
                docs.insert(record.record_id(), record.clone());
            }
            Ok(())
        }

        async fn delete(&self, id: &str) -> GatewayResult<()> {
            self.docs.lock().unwrap().remove(id);
            Ok(())
        }

        async fn query_by_owner(&self, owner_key: &str) -> GatewayResult<Vec<Favorite>> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|doc| doc.user_id == owner_key)
                .cloned()
                .collect())
        }

        async fn query_recent(&self, limit: usize) -> GatewayResult<Vec<Favorite>> {
            self.events.lock().unwrap().push("query");
            if *self.fail_query.lock().unwrap() {
                return Err(GatewayError::Api("query rejected (500)".to_string()));
            }
            // Uploaded docs count as recent, newest first, with seeds after
            let docs = self.docs.lock().unwrap();
            let mut recent: Vec<Favorite> = docs.values().cloned().collect();
            recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            recent.extend(self.seeded_recent.lock().unwrap().iter().cloned());
            recent.truncate(limit);
            Ok(recent)
        }
    }

    fn replicator(store: &Arc<FakeStore>, gateway: &Arc<FakeGateway>) -> Replicator<Favorite> {
        Replicator::new(store.clone(), gateway.clone())
    }

    #[tokio::test]
    async fn test_push_marks_exactly_the_submitted_records() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));
        store.insert_unsynced(Favorite::new("u-1", "p-2", "Night market", None));

        let outcome = replicator(&store, &gateway).run_sync().await;

        assert_eq!(outcome.push, PhaseOutcome::Completed { records: 2 });
        assert_eq!(outcome.pull, None);
        assert_eq!(store.unsynced_count(), 0);
        assert_eq!(gateway.doc_count(), 2);
    }

    #[tokio::test]
    async fn test_push_with_nothing_pending_is_skipped() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());

        let outcome = replicator(&store, &gateway).run_sync().await;

        assert_eq!(outcome.push, PhaseOutcome::Skipped);
        assert_eq!(gateway.upload_batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_flags_untouched_then_redelivers() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));
        store.insert_unsynced(Favorite::new("u-1", "p-2", "Night market", None));
        *gateway.fail_uploads.lock().unwrap() = 1;

        let sync = replicator(&store, &gateway);
        let first = sync.run_sync().await;
        assert!(first.push.is_failure());
        assert_eq!(store.unsynced_count(), 2);
        assert_eq!(gateway.doc_count(), 0);

        // Next cycle redelivers the same records onto the same ids
        let second = sync.run_sync().await;
        assert_eq!(second.push, PhaseOutcome::Completed { records: 2 });
        assert_eq!(store.unsynced_count(), 0);
        assert_eq!(gateway.doc_count(), 2);
        assert_eq!(gateway.upload_batch_calls(), 2);
    }

    #[tokio::test]
    async fn test_mark_failure_keeps_records_eligible_for_resubmission() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));
        *store.fail_mark.lock().unwrap() = true;

        let sync = replicator(&store, &gateway);
        let outcome = sync.run_sync().await;

        // Upload landed but the flags did not flip; at-least-once means the
        // next cycle resubmits onto the same document id
        assert!(outcome.push.is_failure());
        assert_eq!(gateway.doc_count(), 1);
        assert_eq!(store.unsynced_count(), 1);

        // The resubmission overwrites the document instead of duplicating it
        *store.fail_mark.lock().unwrap() = false;
        let retry = sync.run_sync().await;
        assert_eq!(retry.push, PhaseOutcome::Completed { records: 1 });
        assert_eq!(gateway.doc_count(), 1);
        assert_eq!(store.unsynced_count(), 0);
    }

    #[tokio::test]
    async fn test_synced_records_are_not_resubmitted() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));

        let sync = replicator(&store, &gateway);
        let first = sync.run_sync().await;
        assert_eq!(first.push, PhaseOutcome::Completed { records: 1 });

        // Nothing changed locally, so the next cycle finds no candidates
        let second = sync.run_sync().await;
        assert_eq!(second.push, PhaseOutcome::Skipped);
        assert_eq!(gateway.upload_batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_pull_lands_remote_records_as_synced() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let remote = Favorite::new("u-2", "p-9", "Cliff lookout", None);
        gateway.seeded_recent.lock().unwrap().push(remote.clone());

        let outcome = Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        assert_eq!(outcome.push, PhaseOutcome::Skipped);
        assert_eq!(outcome.pull, Some(PhaseOutcome::Completed { records: 1 }));
        let landed = store.row(&remote.id.as_str()).unwrap();
        assert!(landed.synced);
        assert_eq!(landed.place_name, "Cliff lookout");
    }

    #[tokio::test]
    async fn test_pull_overwrites_local_copy_of_same_record() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let mut local = Favorite::new("u-1", "p-1", "Old name", None);
        local.synced = true;
        store.insert_synced(local.clone());

        let mut remote = local.clone();
        remote.place_name = "New name".to_string();
        gateway.seeded_recent.lock().unwrap().push(remote);

        Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        let landed = store.row(&local.id.as_str()).unwrap();
        assert_eq!(landed.place_name, "New name");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_leaves_unrelated_local_records_alone() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let unrelated = Favorite::new("u-1", "p-1", "Harbor walk", None);
        store.insert_synced(unrelated.clone());
        let remote = Favorite::new("u-2", "p-9", "Cliff lookout", None);
        gateway.seeded_recent.lock().unwrap().push(remote.clone());

        Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        let kept = store.row(&unrelated.id.as_str()).unwrap();
        assert_eq!(kept.place_name, "Harbor walk");
        assert!(kept.synced);
        assert!(store.row(&remote.id.as_str()).is_some());
    }

    #[tokio::test]
    async fn test_pull_failure_does_not_undo_a_completed_push() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));
        *gateway.fail_query.lock().unwrap() = true;

        let outcome = Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        assert_eq!(outcome.push, PhaseOutcome::Completed { records: 1 });
        assert!(outcome.pull.unwrap().is_failure());
        assert_eq!(store.unsynced_count(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_does_not_block_the_pull() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));
        *gateway.fail_uploads.lock().unwrap() = 1;
        gateway
            .seeded_recent
            .lock()
            .unwrap()
            .push(Favorite::new("u-2", "p-9", "Cliff lookout", None));

        let outcome = Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        assert!(outcome.push.is_failure());
        assert_eq!(outcome.pull, Some(PhaseOutcome::Completed { records: 1 }));
        assert!(!outcome.is_success());
        // The failed push left its record pending alongside the pulled one
        assert_eq!(store.unsynced_count(), 1);
    }

    #[tokio::test]
    async fn test_push_runs_before_pull_in_a_cycle() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(FakeStore {
            events: events.clone(),
            ..FakeStore::default()
        });
        let gateway = Arc::new(FakeGateway {
            events: events.clone(),
            ..FakeGateway::default()
        });
        store.insert_unsynced(Favorite::new("u-1", "p-1", "Harbor walk", None));

        Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        let log = events.lock().unwrap().clone();
        assert_eq!(log, vec!["select", "upload", "mark", "query", "apply"]);
    }

    #[tokio::test]
    async fn test_empty_pull_is_skipped() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());

        let outcome = Replicator::new(store.clone(), gateway.clone())
            .with_pull(10)
            .run_sync()
            .await;

        assert_eq!(outcome.pull, Some(PhaseOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_edited_record_round_trips_without_reverting() {
        let store = Arc::new(FakeStore::default());
        let gateway = Arc::new(FakeGateway::default());

        // A synced record gets edited locally; the edit must survive the
        // next full cycle even though the pull replays remote state
        let mut favorite = Favorite::new("u-1", "p-1", "Harbor walk", None);
        favorite.synced = true;
        gateway.docs.lock().unwrap().insert(favorite.record_id(), favorite.clone());
        let mut edited = favorite.clone();
        edited.place_name = "Harbor walk at dusk".to_string();
        store.insert_unsynced(edited);

        let sync = Replicator::new(store.clone(), gateway.clone()).with_pull(10);
        let outcome = sync.run_sync().await;

        assert!(outcome.is_success());
        let landed = store.row(&favorite.id.as_str()).unwrap();
        assert_eq!(landed.place_name, "Harbor walk at dusk");
        assert!(landed.synced);
    }

    /// Review gateway whose uploads can be made to fail a set number of times
    #[derive(Default)]
    struct FlakyReviewGateway {
        docs: Mutex<HashMap<String, Review>>,
        fail_uploads: Mutex<u32>,
    }

    impl FlakyReviewGateway {
        fn doc(&self, id: &str) -> Review {
            self.docs.lock().unwrap().get(id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl SyncGateway<Review> for FlakyReviewGateway {
        async fn upload(&self, record: &Review) -> GatewayResult<()> {
            self.docs
                .lock()
                .unwrap()
                .insert(record.record_id(), record.clone());
            Ok(())
        }

        async fn upload_batch(&self, records: &[Review]) -> GatewayResult<()> {
            {
                let mut failures = self.fail_uploads.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(GatewayError::Api("batch rejected (503)".to_string()));
                }
            }
            let mut docs = self.docs.lock().unwrap();
            for record in records {
                docs.insert(record.record_id(), record.clone());
            }
            Ok(())
        }

        async fn delete(&self, id: &str) -> GatewayResult<()> {
            self.docs.lock().unwrap().remove(id);
            Ok(())
        }

        async fn query_by_owner(&self, _owner_key: &str) -> GatewayResult<Vec<Review>> {
            Ok(Vec::new())
        }

        async fn query_recent(&self, _limit: usize) -> GatewayResult<Vec<Review>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_review_edit_survives_a_failed_cycle_then_lands() {
        let db = Database::open_in_memory().await.unwrap();
        let store = Arc::new(ReviewRepository::new(db.connection().clone()));
        let gateway = Arc::new(FlakyReviewGateway::default());
        let sync = Replicator::new(store.clone(), gateway.clone());

        let review = store
            .create("u-1", "p-3", 4.0, "Great view from the top")
            .await
            .unwrap();
        assert!(sync.run_sync().await.is_success());
        assert!((gateway.doc(&review.id.as_str()).rating - 4.0).abs() < f64::EPSILON);

        // An edit after a successful push queues the review again; the
        // failed cycle leaves the remote copy on the old rating
        store
            .update(&review.id, 5.0, "Even better at sunset")
            .await
            .unwrap();
        *gateway.fail_uploads.lock().unwrap() = 1;
        assert!(sync.run_sync().await.push.is_failure());
        assert!((gateway.doc(&review.id.as_str()).rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(store.count_unsynced().await.unwrap(), 1);

        assert!(sync.run_sync().await.is_success());
        let doc = gateway.doc(&review.id.as_str());
        assert!((doc.rating - 5.0).abs() < f64::EPSILON);
        assert_eq!(doc.comment, "Even better at sunset");
        assert_eq!(store.count_unsynced().await.unwrap(), 0);
    }
}
