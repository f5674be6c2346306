//! Review gateway and wire format

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Review;
use crate::sync::SyncGateway;

use super::{decode_documents, DocStoreClient, GatewayError, GatewayResult};

const COLLECTION: &str = "reviews";

/// Wire shape of a review document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReviewDoc {
    id: String,
    user_id: String,
    place_id: String,
    rating: f64,
    comment: String,
    #[serde(default)]
    helpful_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<&Review> for ReviewDoc {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id.as_str(),
            user_id: review.user_id.clone(),
            place_id: review.place_id.clone(),
            rating: review.rating,
            comment: review.comment.clone(),
            helpful_count: review.helpful_count,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

impl TryFrom<ReviewDoc> for Review {
    type Error = GatewayError;

    fn try_from(doc: ReviewDoc) -> GatewayResult<Self> {
        Ok(Self {
            id: doc.id.parse().map_err(|_| {
                GatewayError::InvalidDocument(format!("review id {:?} is not a uuid", doc.id))
            })?,
            user_id: doc.user_id,
            place_id: doc.place_id,
            rating: doc.rating,
            comment: doc.comment,
            helpful_count: doc.helpful_count,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            synced: true,
        })
    }
}

/// Remote gateway for the reviews collection
#[derive(Debug, Clone)]
pub struct ReviewGateway {
    client: DocStoreClient,
}

impl ReviewGateway {
    /// Create a gateway over the shared document-store client
    pub const fn new(client: DocStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SyncGateway<Review> for ReviewGateway {
    async fn upload(&self, record: &Review) -> GatewayResult<()> {
        self.client
            .put_doc(COLLECTION, &record.id.as_str(), &ReviewDoc::from(record))
            .await
    }

    async fn upload_batch(&self, records: &[Review]) -> GatewayResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let docs: Vec<ReviewDoc> = records.iter().map(ReviewDoc::from).collect();
        self.client.post_batch(COLLECTION, &docs).await
    }

    async fn delete(&self, id: &str) -> GatewayResult<()> {
        self.client.delete_doc(COLLECTION, id).await
    }

    async fn query_by_owner(&self, owner_key: &str) -> GatewayResult<Vec<Review>> {
        let documents = self
            .client
            .query_docs(COLLECTION, &[("owner", owner_key.to_string())])
            .await?;
        Ok(decode_documents::<ReviewDoc, Review>(COLLECTION, documents))
    }

    async fn query_recent(&self, limit: usize) -> GatewayResult<Vec<Review>> {
        let documents = self
            .client
            .query_docs(
                COLLECTION,
                &[
                    ("order", "created_desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(decode_documents::<ReviewDoc, Review>(COLLECTION, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_round_trip_preserves_rating_precision() {
        let review = Review::new("user-1", "place-2", 4.5, "Great views");
        let doc = ReviewDoc::from(&review);
        let encoded = serde_json::to_string(&doc).unwrap();
        let decoded: ReviewDoc = serde_json::from_str(&encoded).unwrap();
        let restored = Review::try_from(decoded).unwrap();

        assert!((restored.rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(restored.id, review.id);
        assert!(restored.synced);
    }

    #[test]
    fn doc_defaults_missing_helpful_count() {
        let id = crate::models::ReviewId::new();
        let value = json!({
            "id": id.as_str(),
            "user_id": "u-1",
            "place_id": "p-1",
            "rating": 3.5,
            "comment": "fine",
            "created_at": 1,
            "updated_at": 1
        });
        let doc: ReviewDoc = serde_json::from_value(value).unwrap();
        let review = Review::try_from(doc).unwrap();
        assert_eq!(review.helpful_count, 0);
    }

    #[test]
    fn decode_documents_skips_wrong_shapes() {
        let good = Review::new("user-1", "place-1", 4.0, "ok");
        let documents = vec![
            json!({"rating": "five stars"}),
            serde_json::to_value(ReviewDoc::from(&good)).unwrap(),
        ];

        let decoded = decode_documents::<ReviewDoc, Review>(COLLECTION, documents);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, good.id);
    }

    #[test]
    fn one_malformed_document_does_not_sink_the_batch() {
        let mut documents: Vec<serde_json::Value> = (0..9)
            .map(|n| {
                let review = Review::new("user-1", format!("place-{n}"), 4.0, "ok");
                serde_json::to_value(ReviewDoc::from(&review)).unwrap()
            })
            .collect();
        documents.insert(4, json!({"id": "not-a-uuid", "garbage": true}));

        let decoded = decode_documents::<ReviewDoc, Review>(COLLECTION, documents);
        assert_eq!(decoded.len(), 9);
        assert!(decoded.iter().all(|review| review.synced));
    }
}
