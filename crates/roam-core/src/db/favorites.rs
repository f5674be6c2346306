//! Favorite repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Favorite, FavoriteId};
use crate::sync::SyncStore;
use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

/// Rows per multi-row statement, kept well under SQLite's parameter limit
const BATCH_CHUNK: usize = 50;

/// libSQL-backed storage for favorites
pub struct FavoriteRepository {
    conn: Connection,
}

impl FavoriteRepository {
    /// Create a new repository over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Create a new favorite for the given user and place
    pub async fn create(
        &self,
        user_id: &str,
        place_id: &str,
        place_name: &str,
        category: Option<String>,
    ) -> Result<Favorite> {
        let favorite = Favorite::new(user_id, place_id, place_name, category);
        self.upsert(&favorite).await?;
        Ok(favorite)
    }

    /// Get a favorite by ID
    pub async fn get(&self, id: &FavoriteId) -> Result<Option<Favorite>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, place_name, category, created_at, updated_at, synced
                 FROM favorites WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    /// List favorites, newest first
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Favorite>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, place_name, category, created_at, updated_at, synced
                 FROM favorites
                 ORDER BY created_at DESC
                 LIMIT ?1 OFFSET ?2",
                params![limit as i64, offset as i64],
            )
            .await?;

        let mut favorites = Vec::new();
        while let Some(row) = rows.next().await? {
            favorites.push(Self::parse_row(&row)?);
        }
        Ok(favorites)
    }

    /// Remove a favorite. The local row disappears immediately; remote
    /// cleanup is a best-effort concern of the caller.
    pub async fn delete(&self, id: &FavoriteId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM favorites WHERE id = ?1", params![id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// All favorites that have not reached the remote store yet, oldest first
    pub async fn select_unsynced(&self) -> Result<Vec<Favorite>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, place_name, category, created_at, updated_at, synced
                 FROM favorites
                 WHERE synced = 0
                 ORDER BY updated_at ASC",
                (),
            )
            .await?;

        let mut favorites = Vec::new();
        while let Some(row) = rows.next().await? {
            favorites.push(Self::parse_row(&row)?);
        }
        Ok(favorites)
    }

    /// Flag a single favorite as replicated
    pub async fn mark_synced(&self, id: &FavoriteId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE favorites SET synced = 1 WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Flag exactly the given favorites as replicated, one statement per
    /// chunk. Ids deleted since selection simply match no row.
    pub async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        for chunk in ids.chunks(BATCH_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("UPDATE favorites SET synced = 1 WHERE id IN ({placeholders})");
            let values: Vec<Value> = chunk.iter().map(|id| Value::from(id.clone())).collect();
            self.conn.execute(&sql, values).await?;
        }
        Ok(())
    }

    /// Insert or overwrite a favorite keyed by its ID
    pub async fn upsert(&self, favorite: &Favorite) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(favorite)).await
    }

    /// Insert or overwrite favorites keyed by ID, multi-row statements
    pub async fn upsert_batch(&self, favorites: &[Favorite]) -> Result<()> {
        for chunk in favorites.chunks(BATCH_CHUNK) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO favorites
                 (id, user_id, place_id, place_name, category, created_at, updated_at, synced)
                 VALUES {placeholders}
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     place_id = excluded.place_id,
                     place_name = excluded.place_name,
                     category = excluded.category,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     synced = excluded.synced"
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 8);
            for favorite in chunk {
                values.push(Value::from(favorite.id.as_str()));
                values.push(Value::from(favorite.user_id.clone()));
                values.push(Value::from(favorite.place_id.clone()));
                values.push(Value::from(favorite.place_name.clone()));
                values.push(favorite.category.clone().map_or(Value::Null, Value::from));
                values.push(Value::from(favorite.created_at));
                values.push(Value::from(favorite.updated_at));
                values.push(Value::from(i64::from(favorite.synced)));
            }
            self.conn.execute(&sql, values).await?;
        }
        Ok(())
    }

    /// How many favorites still need to be pushed
    pub async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM favorites WHERE synced = 0", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Parse a favorite from a database row
    fn parse_row(row: &Row) -> Result<Favorite> {
        let id: String = row.get(0)?;
        let category = match row.get_value(4)? {
            Value::Text(text) => Some(text),
            _ => None,
        };
        Ok(Favorite {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid favorite id: {id}")))?,
            user_id: row.get(1)?,
            place_id: row.get(2)?,
            place_name: row.get(3)?,
            category,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            synced: row.get::<i64>(7)? != 0,
        })
    }
}

#[async_trait]
impl SyncStore<Favorite> for FavoriteRepository {
    async fn select_unsynced(&self) -> Result<Vec<Favorite>> {
        Self::select_unsynced(self).await
    }

    async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        Self::mark_synced_batch(self, ids).await
    }

    async fn apply_remote_batch(&self, records: &[Favorite]) -> Result<()> {
        let mut synced = records.to_vec();
        for record in &mut synced {
            record.synced = true;
        }
        self.upsert_batch(&synced).await
    }
}
