//! Travel route repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{RouteId, RouteStop, TravelRoute};
use crate::sync::SyncStore;
use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

/// Ids per IN-clause chunk, kept well under SQLite's parameter limit
const BATCH_CHUNK: usize = 50;

/// libSQL-backed storage for travel routes and their stops
pub struct RouteRepository {
    conn: Connection,
}

impl RouteRepository {
    /// Create a new repository over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Create a new route with its stops
    pub async fn create(
        &self,
        owner_id: &str,
        name: &str,
        summary: Option<String>,
        stops: Vec<RouteStop>,
    ) -> Result<TravelRoute> {
        let route = TravelRoute::new(owner_id, name, summary, stops);
        self.upsert(&route).await?;
        Ok(route)
    }

    /// Get a route by ID, stops ordered by their position ordinal
    pub async fn get(&self, id: &RouteId) -> Result<Option<TravelRoute>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, name, summary, created_at, updated_at, synced
                 FROM routes WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let mut route = Self::parse_route_row(&row)?;
                route.stops = self.load_stops(&route.id.as_str()).await?;
                Ok(Some(route))
            }
            None => Ok(None),
        }
    }

    /// List routes, newest first
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<TravelRoute>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, name, summary, created_at, updated_at, synced
                 FROM routes
                 ORDER BY created_at DESC
                 LIMIT ?1 OFFSET ?2",
                params![limit as i64, offset as i64],
            )
            .await?;

        let mut routes = Vec::new();
        while let Some(row) = rows.next().await? {
            routes.push(Self::parse_route_row(&row)?);
        }
        for route in &mut routes {
            route.stops = self.load_stops(&route.id.as_str()).await?;
        }
        Ok(routes)
    }

    /// Remove a route; its stops go with it via the cascade
    pub async fn delete(&self, id: &RouteId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM routes WHERE id = ?1", params![id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// All routes that have not reached the remote store yet, oldest first
    pub async fn select_unsynced(&self) -> Result<Vec<TravelRoute>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, name, summary, created_at, updated_at, synced
                 FROM routes
                 WHERE synced = 0
                 ORDER BY updated_at ASC",
                (),
            )
            .await?;

        let mut routes = Vec::new();
        while let Some(row) = rows.next().await? {
            routes.push(Self::parse_route_row(&row)?);
        }
        for route in &mut routes {
            route.stops = self.load_stops(&route.id.as_str()).await?;
        }
        Ok(routes)
    }

    /// Flag a single route as replicated
    pub async fn mark_synced(&self, id: &RouteId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE routes SET synced = 1 WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Flag exactly the given routes as replicated
    pub async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        for chunk in ids.chunks(BATCH_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("UPDATE routes SET synced = 1 WHERE id IN ({placeholders})");
            let values: Vec<Value> = chunk.iter().map(|id| Value::from(id.clone())).collect();
            self.conn.execute(&sql, values).await?;
        }
        Ok(())
    }

    /// Insert or overwrite a route keyed by its ID, stops replaced wholesale
    pub async fn upsert(&self, route: &TravelRoute) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(route)).await
    }

    /// Insert or overwrite routes keyed by ID inside one transaction.
    ///
    /// Stops are replaced rather than merged; the remote copy of a route is
    /// always a complete snapshot.
    pub async fn upsert_batch(&self, routes: &[TravelRoute]) -> Result<()> {
        if routes.is_empty() {
            return Ok(());
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        if let Err(e) = self.upsert_all(routes).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn upsert_all(&self, routes: &[TravelRoute]) -> Result<()> {
        for route in routes {
            let values: Vec<Value> = vec![
                Value::from(route.id.as_str()),
                Value::from(route.owner_id.clone()),
                Value::from(route.name.clone()),
                route.summary.clone().map_or(Value::Null, Value::from),
                Value::from(route.created_at),
                Value::from(route.updated_at),
                Value::from(i64::from(route.synced)),
            ];
            self.conn
                .execute(
                    "INSERT INTO routes
                     (id, owner_id, name, summary, created_at, updated_at, synced)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                         owner_id = excluded.owner_id,
                         name = excluded.name,
                         summary = excluded.summary,
                         created_at = excluded.created_at,
                         updated_at = excluded.updated_at,
                         synced = excluded.synced",
                    values,
                )
                .await?;

            self.conn
                .execute(
                    "DELETE FROM route_stops WHERE route_id = ?1",
                    params![route.id.as_str()],
                )
                .await?;

            for stop in &route.stops {
                self.conn
                    .execute(
                        "INSERT INTO route_stops (route_id, place_id, name, position)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            route.id.as_str(),
                            stop.place_id.clone(),
                            stop.name.clone(),
                            stop.position
                        ],
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// How many routes still need to be pushed
    pub async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM routes WHERE synced = 0", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Load the stops of one route, ordered by position
    async fn load_stops(&self, route_id: &str) -> Result<Vec<RouteStop>> {
        let mut rows = self
            .conn
            .query(
                "SELECT place_id, name, position
                 FROM route_stops
                 WHERE route_id = ?1
                 ORDER BY position ASC",
                params![route_id],
            )
            .await?;

        let mut stops = Vec::new();
        while let Some(row) = rows.next().await? {
            stops.push(RouteStop {
                place_id: row.get(0)?,
                name: row.get(1)?,
                position: row.get(2)?,
            });
        }
        Ok(stops)
    }

    /// Parse a route (without stops) from a database row
    fn parse_route_row(row: &Row) -> Result<TravelRoute> {
        let id: String = row.get(0)?;
        let summary = match row.get_value(3)? {
            Value::Text(text) => Some(text),
            _ => None,
        };
        Ok(TravelRoute {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid route id: {id}")))?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            summary,
            stops: Vec::new(),
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            synced: row.get::<i64>(6)? != 0,
        })
    }
}

#[async_trait]
impl SyncStore<TravelRoute> for RouteRepository {
    async fn select_unsynced(&self) -> Result<Vec<TravelRoute>> {
        Self::select_unsynced(self).await
    }

    async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        Self::mark_synced_batch(self, ids).await
    }

    async fn apply_remote_batch(&self, records: &[TravelRoute]) -> Result<()> {
        let mut synced = records.to_vec();
        for record in &mut synced {
            record.synced = true;
        }
        self.upsert_batch(&synced).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, RouteRepository) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RouteRepository::new(db.connection().clone());
        (db, repo)
    }

    fn sample_stops() -> Vec<RouteStop> {
        vec![
            RouteStop::new("p-2", "Market", 1),
            RouteStop::new("p-1", "Old town", 0),
            RouteStop::new("p-3", "Harbor", 2),
        ]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get_orders_stops_by_position() {
        let (_db, repo) = setup().await;
        let route = repo
            .create("user-1", "Day one", Some("walking loop".to_string()), sample_stops())
            .await
            .unwrap();

        let loaded = repo.get(&route.id).await.unwrap().unwrap();
        let names: Vec<&str> = loaded.stops.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Old town", "Market", "Harbor"]);
        assert_eq!(loaded.summary.as_deref(), Some("walking loop"));
        assert!(!loaded.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_replaces_stops_wholesale() {
        let (_db, repo) = setup().await;
        let mut route = repo
            .create("user-1", "Day one", None, sample_stops())
            .await
            .unwrap();

        route.stops = vec![RouteStop::new("p-9", "Lighthouse", 0)];
        repo.upsert(&route).await.unwrap();

        let loaded = repo.get(&route.id).await.unwrap().unwrap();
        assert_eq!(loaded.stops.len(), 1);
        assert_eq!(loaded.stops[0].name, "Lighthouse");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_cascades_to_stops() {
        let (db, repo) = setup().await;
        let route = repo
            .create("user-1", "Day one", None, sample_stops())
            .await
            .unwrap();

        repo.delete(&route.id).await.unwrap();
        assert!(repo.get(&route.id).await.unwrap().is_none());

        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM route_stops", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_route() {
        let (_db, repo) = setup().await;
        let err = repo.delete(&RouteId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_batch() {
        let (_db, repo) = setup().await;
        let first = repo.create("user-1", "One", None, vec![]).await.unwrap();
        let second = repo.create("user-1", "Two", None, vec![]).await.unwrap();

        repo.mark_synced_batch(&[first.id.as_str()]).await.unwrap();

        assert!(repo.get(&first.id).await.unwrap().unwrap().synced);
        assert!(!repo.get(&second.id).await.unwrap().unwrap().synced);

        let unsynced = repo.select_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, second.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_select_unsynced_includes_stops() {
        let (_db, repo) = setup().await;
        repo.create("user-1", "Day one", None, sample_stops())
            .await
            .unwrap();

        let unsynced = repo.select_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].stops.len(), 3);
        assert_eq!(unsynced[0].stops[0].position, 0);
    }
}
