//! Sync service facade.
//!
//! Wires the repositories, gateways, replicators, and scheduler into the
//! one object an embedder holds. Every mutation goes through here: it
//! lands locally first, then nudges the scheduler so replication happens
//! soon without the caller ever waiting on the network.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::db::{Database, FavoriteRepository, ReviewRepository, RouteRepository};
use crate::error::{Error, Result};
use crate::models::{
    Favorite, FavoriteId, Review, ReviewId, RouteId, RouteStop, TravelRoute, MAX_RATING,
    MIN_RATING,
};
use crate::remote::{DocStoreClient, FavoriteGateway, ReviewGateway, RouteGateway};
use crate::util::normalize_text_option;

use super::connectivity::ConnectivityHandle;
use super::record::EntityKind;
use super::replicator::{Replicate, Replicator, SyncGateway};
use super::scheduler::SyncScheduler;
use super::SyncOutcome;

/// Unsynced record counts per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    pub favorites: usize,
    pub reviews: usize,
    pub routes: usize,
}

impl PendingCounts {
    /// Total records waiting for the next push
    #[must_use]
    pub const fn total(&self) -> usize {
        self.favorites + self.reviews + self.routes
    }
}

/// Remote document counts for the configured user, per collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteCounts {
    pub favorites: usize,
    pub reviews: usize,
    pub routes: usize,
}

/// The object embedders hold: local CRUD that feeds the sync engine,
/// plus control over when replication runs.
///
/// Local operations never wait on the network. Deletes remove the local
/// row immediately and fire one best-effort remote delete that is never
/// retried; an orphaned remote copy is accepted.
pub struct SyncService {
    favorites: Arc<FavoriteRepository>,
    reviews: Arc<ReviewRepository>,
    routes: Arc<RouteRepository>,
    favorite_gateway: Arc<FavoriteGateway>,
    review_gateway: Arc<ReviewGateway>,
    route_gateway: Arc<RouteGateway>,
    replicators: HashMap<EntityKind, Arc<dyn Replicate>>,
    scheduler: SyncScheduler,
    connectivity: ConnectivityHandle,
    settings: SyncSettings,
}

impl SyncService {
    /// Wire the full sync stack over an open database
    pub fn new(db: &Database, settings: SyncSettings) -> Result<Self> {
        let client = DocStoreClient::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.request_timeout,
        )?;

        let favorites = Arc::new(FavoriteRepository::new(db.connection().clone()));
        let reviews = Arc::new(ReviewRepository::new(db.connection().clone()));
        let routes = Arc::new(RouteRepository::new(db.connection().clone()));

        let favorite_gateway = Arc::new(FavoriteGateway::new(client.clone()));
        let review_gateway = Arc::new(ReviewGateway::new(client.clone()));
        let route_gateway = Arc::new(RouteGateway::new(client));

        let mut replicators: HashMap<EntityKind, Arc<dyn Replicate>> = HashMap::new();
        replicators.insert(
            EntityKind::Favorite,
            Arc::new(Replicator::new(favorites.clone(), favorite_gateway.clone())),
        );
        replicators.insert(
            EntityKind::Review,
            Arc::new(
                Replicator::new(reviews.clone(), review_gateway.clone())
                    .with_pull(settings.pull_limit),
            ),
        );
        replicators.insert(
            EntityKind::Route,
            Arc::new(Replicator::new(routes.clone(), route_gateway.clone())),
        );

        let connectivity = ConnectivityHandle::default();
        let scheduler = SyncScheduler::new(
            replicators.values().cloned().collect(),
            connectivity.clone(),
            settings.retry.clone(),
        );

        Ok(Self {
            favorites,
            reviews,
            routes,
            favorite_gateway,
            review_gateway,
            route_gateway,
            replicators,
            scheduler,
            connectivity,
            settings,
        })
    }

    /// Connectivity flag the embedder keeps updated from its platform
    /// reachability callbacks
    #[must_use]
    pub fn connectivity(&self) -> ConnectivityHandle {
        self.connectivity.clone()
    }

    /// Settings the service was built with
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // Scheduling ------------------------------------------------------------

    /// Start periodic background sync for every entity
    pub fn enable_periodic_sync(&self) -> Result<()> {
        for entity in EntityKind::ALL {
            self.scheduler
                .schedule_periodic(entity, self.settings.sync_interval)?;
        }
        Ok(())
    }

    /// Start periodic background sync for one entity
    pub fn enable_periodic_sync_for(&self, entity: EntityKind) -> Result<()> {
        self.scheduler
            .schedule_periodic(entity, self.settings.sync_interval)
    }

    /// Stop periodic sync for one entity
    pub fn disable_periodic_sync_for(&self, entity: EntityKind) {
        self.scheduler.cancel_periodic(entity);
    }

    /// True while a periodic worker for the entity is alive
    #[must_use]
    pub fn is_periodic_active(&self, entity: EntityKind) -> bool {
        self.scheduler.is_scheduled(entity)
    }

    /// Stop all background sync work
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Nudge the scheduler after a local mutation; returns immediately.
    /// Sync failures never surface through mutation paths.
    pub fn notify_mutation(&self, entity: EntityKind) {
        if let Err(error) = self.scheduler.trigger_immediate(entity) {
            tracing::warn!("Could not queue immediate {entity} sync: {error}");
        }
    }

    // Running sync directly -------------------------------------------------

    /// Run one sync cycle for one entity and report the outcome
    pub async fn sync_now(&self, entity: EntityKind) -> Result<SyncOutcome> {
        let replicator = self
            .replicators
            .get(&entity)
            .ok_or_else(|| Error::Sync(format!("no replicator registered for {entity}")))?;
        Ok(replicator.run_sync().await)
    }

    /// Run one sync cycle for every entity, in order
    pub async fn sync_all_now(&self) -> Result<Vec<SyncOutcome>> {
        let mut outcomes = Vec::with_capacity(EntityKind::ALL.len());
        for entity in EntityKind::ALL {
            outcomes.push(self.sync_now(entity).await?);
        }
        Ok(outcomes)
    }

    // Status ----------------------------------------------------------------

    /// How many records wait for the next push, per entity
    pub async fn pending_counts(&self) -> Result<PendingCounts> {
        Ok(PendingCounts {
            favorites: self.favorites.count_unsynced().await?,
            reviews: self.reviews.count_unsynced().await?,
            routes: self.routes.count_unsynced().await?,
        })
    }

    /// Count this user's documents in the remote store. Diagnostics only;
    /// the local store stays authoritative.
    pub async fn remote_counts(&self) -> Result<RemoteCounts> {
        let user = self.settings.user_id.as_str();
        Ok(RemoteCounts {
            favorites: self.favorite_gateway.query_by_owner(user).await?.len(),
            reviews: self.review_gateway.query_by_owner(user).await?.len(),
            routes: self.route_gateway.query_by_owner(user).await?.len(),
        })
    }

    // Favorites -------------------------------------------------------------

    /// Save a favorite locally and nudge replication
    pub async fn add_favorite(
        &self,
        place_id: &str,
        place_name: &str,
        category: Option<String>,
    ) -> Result<Favorite> {
        let place_id = place_id.trim();
        let place_name = place_name.trim();
        if place_id.is_empty() || place_name.is_empty() {
            return Err(Error::InvalidInput(
                "place id and place name must not be empty".to_string(),
            ));
        }

        let favorite = self
            .favorites
            .create(
                &self.settings.user_id,
                place_id,
                place_name,
                normalize_text_option(category),
            )
            .await?;
        self.notify_mutation(EntityKind::Favorite);
        Ok(favorite)
    }

    /// List favorites, newest first
    pub async fn list_favorites(&self, limit: usize, offset: usize) -> Result<Vec<Favorite>> {
        self.favorites.list(limit, offset).await
    }

    /// Remove a favorite locally and fire one best-effort remote delete
    pub async fn remove_favorite(&self, id: &FavoriteId) -> Result<()> {
        self.favorites.delete(id).await?;

        let gateway = self.favorite_gateway.clone();
        let doc_id = id.as_str();
        tokio::spawn(async move {
            if let Err(error) = gateway.delete(&doc_id).await {
                tracing::warn!("Remote favorite delete failed, will not retry: {error}");
            }
        });
        Ok(())
    }

    // Reviews ---------------------------------------------------------------

    /// Save a review locally and nudge replication
    pub async fn add_review(&self, place_id: &str, rating: f64, comment: &str) -> Result<Review> {
        let place_id = place_id.trim();
        if place_id.is_empty() {
            return Err(Error::InvalidInput("place id must not be empty".to_string()));
        }
        validate_rating(rating)?;

        let review = self
            .reviews
            .create(&self.settings.user_id, place_id, rating, comment.trim())
            .await?;
        self.notify_mutation(EntityKind::Review);
        Ok(review)
    }

    /// List reviews, newest first
    pub async fn list_reviews(&self, limit: usize, offset: usize) -> Result<Vec<Review>> {
        self.reviews.list(limit, offset).await
    }

    /// Edit a review. The edit becomes the local truth and wins over
    /// whatever the remote copy currently says.
    pub async fn update_review(&self, id: &ReviewId, rating: f64, comment: &str) -> Result<Review> {
        validate_rating(rating)?;
        let review = self.reviews.update(id, rating, comment.trim()).await?;
        self.notify_mutation(EntityKind::Review);
        Ok(review)
    }

    /// Remove a review locally and fire one best-effort remote delete
    pub async fn remove_review(&self, id: &ReviewId) -> Result<()> {
        self.reviews.delete(id).await?;

        let gateway = self.review_gateway.clone();
        let doc_id = id.as_str();
        tokio::spawn(async move {
            if let Err(error) = gateway.delete(&doc_id).await {
                tracing::warn!("Remote review delete failed, will not retry: {error}");
            }
        });
        Ok(())
    }

    // Routes ----------------------------------------------------------------

    /// Save a route with its stops locally and nudge replication
    pub async fn create_route(
        &self,
        name: &str,
        summary: Option<String>,
        stops: Vec<RouteStop>,
    ) -> Result<TravelRoute> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("route name must not be empty".to_string()));
        }

        let route = self
            .routes
            .create(
                &self.settings.user_id,
                name,
                normalize_text_option(summary),
                stops,
            )
            .await?;
        self.notify_mutation(EntityKind::Route);
        Ok(route)
    }

    /// List routes, newest first
    pub async fn list_routes(&self, limit: usize, offset: usize) -> Result<Vec<TravelRoute>> {
        self.routes.list(limit, offset).await
    }

    /// Remove a route locally and fire one best-effort remote delete
    pub async fn remove_route(&self, id: &RouteId) -> Result<()> {
        self.routes.delete(id).await?;

        let gateway = self.route_gateway.clone();
        let doc_id = id.as_str();
        tokio::spawn(async move {
            if let Err(error) = gateway.delete(&doc_id).await {
                tracing::warn!("Remote route delete failed, will not retry: {error}");
            }
        });
        Ok(())
    }
}

fn validate_rating(rating: f64) -> Result<()> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use crate::sync::{PhaseOutcome, RetryPolicy};

    use super::*;

    // Nothing listens on this port; requests fail with connection refused
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    async fn service() -> SyncService {
        let db = Database::open_in_memory().await.unwrap();
        let settings = SyncSettings::new(UNREACHABLE, "traveler-1")
            .with_request_timeout(Duration::from_secs(1))
            .with_retry(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
            });
        SyncService::new(&db, settings).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_writes_land_locally_when_remote_is_unreachable() {
        let service = service().await;

        let favorite = service
            .add_favorite("p-1", "Harbor walk", Some("outdoors".to_string()))
            .await
            .unwrap();
        assert!(!favorite.synced);

        let listed = service.list_favorites(10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].place_name, "Harbor walk");

        let pending = service.pending_counts().await.unwrap();
        assert_eq!(pending.favorites, 1);
        assert_eq!(pending.total(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_now_reports_failure_and_keeps_records_pending() {
        let service = service().await;
        service.add_favorite("p-1", "Harbor walk", None).await.unwrap();

        let outcome = service.sync_now(EntityKind::Favorite).await.unwrap();
        assert!(outcome.push.is_failure());
        assert_eq!(outcome.pull, None);

        let pending = service.pending_counts().await.unwrap();
        assert_eq!(pending.favorites, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_all_covers_every_entity_in_order() {
        let service = service().await;

        let outcomes = service.sync_all_now().await.unwrap();
        let entities: Vec<EntityKind> = outcomes.iter().map(|outcome| outcome.entity).collect();
        assert_eq!(
            entities,
            vec![EntityKind::Favorite, EntityKind::Review, EntityKind::Route]
        );

        // Only reviews run a pull phase
        assert_eq!(outcomes[0].pull, None);
        assert!(outcomes[1].pull.is_some());
        assert_eq!(outcomes[2].pull, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_database_syncs_as_skipped_push() {
        let service = service().await;

        let outcome = service.sync_now(EntityKind::Route).await.unwrap();
        assert_eq!(outcome.push, PhaseOutcome::Skipped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rating_range_is_enforced() {
        let service = service().await;

        assert!(service.add_review("p-1", 9.0, "great").await.is_err());
        assert!(service.add_review("p-1", 0.0, "meh").await.is_err());
        assert!(service.add_review("p-1", f64::NAN, "huh").await.is_err());

        let review = service.add_review("p-1", 4.5, "great").await.unwrap();
        assert!((review.rating - 4.5).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_review_edit_goes_back_into_the_pending_set() {
        let service = service().await;
        let review = service.add_review("p-1", 4.0, "good").await.unwrap();

        let updated = service.update_review(&review.id, 5.0, "better").await.unwrap();
        assert!((updated.rating - 5.0).abs() < f64::EPSILON);
        assert!(!updated.synced);

        let pending = service.pending_counts().await.unwrap();
        assert_eq!(pending.reviews, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_favorite_deletes_locally_despite_remote_failure() {
        let service = service().await;
        let favorite = service.add_favorite("p-1", "Harbor walk", None).await.unwrap();

        service.remove_favorite(&favorite.id).await.unwrap();

        assert!(service.list_favorites(10, 0).await.unwrap().is_empty());
        assert_eq!(service.pending_counts().await.unwrap().favorites, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_missing_favorite_is_not_found() {
        let service = service().await;
        let result = service.remove_favorite(&FavoriteId::new()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_route_round_trips_through_the_service() {
        let service = service().await;

        let stops = vec![
            RouteStop {
                place_id: "p-2".to_string(),
                name: "Old town".to_string(),
                position: 1,
            },
            RouteStop {
                place_id: "p-1".to_string(),
                name: "Harbor".to_string(),
                position: 0,
            },
        ];
        service
            .create_route("Day one", Some("A slow morning".to_string()), stops)
            .await
            .unwrap();

        let routes = service.list_routes(10, 0).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops[0].name, "Harbor");
        assert_eq!(routes[0].stops[1].name, "Old town");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blank_inputs_are_rejected() {
        let service = service().await;

        assert!(service.add_favorite("  ", "Harbor", None).await.is_err());
        assert!(service.add_favorite("p-1", "", None).await.is_err());
        assert!(service.create_route("   ", None, vec![]).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_counts_propagate_gateway_errors() {
        let service = service().await;
        assert!(service.remote_counts().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_periodic_sync_toggles_per_entity() {
        let service = service().await;

        service.enable_periodic_sync().unwrap();
        for entity in EntityKind::ALL {
            assert!(service.is_periodic_active(entity));
        }

        service.disable_periodic_sync_for(EntityKind::Review);
        assert!(!service.is_periodic_active(EntityKind::Review));
        assert!(service.is_periodic_active(EntityKind::Favorite));

        service.shutdown();
        assert!(!service.is_periodic_active(EntityKind::Favorite));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mutation_notify_never_errors_out() {
        let service = service().await;
        // No worker scheduled yet; the nudge spawns a detached one-shot
        service.notify_mutation(EntityKind::Favorite);
        service.notify_mutation(EntityKind::Favorite);
    }
}
