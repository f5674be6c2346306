//! Review repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{round_rating, Review, ReviewId};
use crate::sync::SyncStore;
use async_trait::async_trait;
use libsql::{params, Connection, Row, Value};

/// Rows per multi-row statement, kept well under SQLite's parameter limit
const BATCH_CHUNK: usize = 50;

/// libSQL-backed storage for reviews
pub struct ReviewRepository {
    conn: Connection,
}

impl ReviewRepository {
    /// Create a new repository over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Create a new review
    pub async fn create(
        &self,
        user_id: &str,
        place_id: &str,
        rating: f64,
        comment: &str,
    ) -> Result<Review> {
        let review = Review::new(user_id, place_id, rating, comment);

        self.conn
            .execute(
                "INSERT INTO reviews
                 (id, user_id, place_id, rating, comment, helpful_count, created_at, updated_at, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    review.id.as_str(),
                    review.user_id.clone(),
                    review.place_id.clone(),
                    review.rating,
                    review.comment.clone(),
                    review.helpful_count,
                    review.created_at,
                    review.updated_at,
                    i64::from(review.synced)
                ],
            )
            .await?;

        Ok(review)
    }

    /// Get a review by ID
    pub async fn get(&self, id: &ReviewId) -> Result<Option<Review>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, rating, comment, helpful_count, created_at, updated_at, synced
                 FROM reviews WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    /// List reviews, newest first
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Review>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, rating, comment, helpful_count, created_at, updated_at, synced
                 FROM reviews
                 ORDER BY created_at DESC
                 LIMIT ?1 OFFSET ?2",
                params![limit as i64, offset as i64],
            )
            .await?;

        let mut reviews = Vec::new();
        while let Some(row) = rows.next().await? {
            reviews.push(Self::parse_row(&row)?);
        }
        Ok(reviews)
    }

    /// Rewrite a review's rating and comment. The edit makes the row
    /// unsynced again so the next push picks it up.
    pub async fn update(&self, id: &ReviewId, rating: f64, comment: &str) -> Result<Review> {
        let now = crate::util::now_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE reviews
                 SET rating = ?1, comment = ?2, updated_at = ?3, synced = 0
                 WHERE id = ?4",
                params![round_rating(rating), comment, now, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(id).await?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Remove a review. The local row disappears immediately; remote
    /// cleanup is a best-effort concern of the caller.
    pub async fn delete(&self, id: &ReviewId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM reviews WHERE id = ?1", params![id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// All reviews that have not reached the remote store yet, oldest first
    pub async fn select_unsynced(&self) -> Result<Vec<Review>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, place_id, rating, comment, helpful_count, created_at, updated_at, synced
                 FROM reviews
                 WHERE synced = 0
                 ORDER BY updated_at ASC",
                (),
            )
            .await?;

        let mut reviews = Vec::new();
        while let Some(row) = rows.next().await? {
            reviews.push(Self::parse_row(&row)?);
        }
        Ok(reviews)
    }

    /// Flag a single review as replicated
    pub async fn mark_synced(&self, id: &ReviewId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE reviews SET synced = 1 WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Flag exactly the given reviews as replicated
    pub async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        for chunk in ids.chunks(BATCH_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("UPDATE reviews SET synced = 1 WHERE id IN ({placeholders})");
            let values: Vec<Value> = chunk.iter().map(|id| Value::from(id.clone())).collect();
            self.conn.execute(&sql, values).await?;
        }
        Ok(())
    }

    /// Insert or overwrite a review keyed by its ID
    pub async fn upsert(&self, review: &Review) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(review)).await
    }

    /// Insert or overwrite reviews keyed by ID, multi-row statements
    pub async fn upsert_batch(&self, reviews: &[Review]) -> Result<()> {
        for chunk in reviews.chunks(BATCH_CHUNK) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO reviews
                 (id, user_id, place_id, rating, comment, helpful_count, created_at, updated_at, synced)
                 VALUES {placeholders}
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     place_id = excluded.place_id,
                     rating = excluded.rating,
                     comment = excluded.comment,
                     helpful_count = excluded.helpful_count,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     synced = excluded.synced"
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 9);
            for review in chunk {
                values.push(Value::from(review.id.as_str()));
                values.push(Value::from(review.user_id.clone()));
                values.push(Value::from(review.place_id.clone()));
                values.push(Value::from(review.rating));
                values.push(Value::from(review.comment.clone()));
                values.push(Value::from(review.helpful_count));
                values.push(Value::from(review.created_at));
                values.push(Value::from(review.updated_at));
                values.push(Value::from(i64::from(review.synced)));
            }
            self.conn.execute(&sql, values).await?;
        }
        Ok(())
    }

    /// How many reviews still need to be pushed
    pub async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM reviews WHERE synced = 0", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Parse a review from a database row
    fn parse_row(row: &Row) -> Result<Review> {
        let id: String = row.get(0)?;
        Ok(Review {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid review id: {id}")))?,
            user_id: row.get(1)?,
            place_id: row.get(2)?,
            rating: row.get(3)?,
            comment: row.get(4)?,
            helpful_count: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            synced: row.get::<i64>(8)? != 0,
        })
    }
}

#[async_trait]
impl SyncStore<Review> for ReviewRepository {
    async fn select_unsynced(&self) -> Result<Vec<Review>> {
        Self::select_unsynced(self).await
    }

    async fn mark_synced_batch(&self, ids: &[String]) -> Result<()> {
        Self::mark_synced_batch(self, ids).await
    }

    async fn apply_remote_batch(&self, records: &[Review]) -> Result<()> {
        let mut synced = records.to_vec();
        for record in &mut synced {
            record.synced = true;
        }
        self.upsert_batch(&synced).await
    }
}
