//! Favorite gateway and wire format

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Favorite;
use crate::sync::SyncGateway;

use super::{decode_documents, DocStoreClient, GatewayError, GatewayResult};

const COLLECTION: &str = "favorites";

/// Wire shape of a favorite document. The local `synced` flag is device
/// bookkeeping and never crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FavoriteDoc {
    id: String,
    user_id: String,
    place_id: String,
    place_name: String,
    #[serde(default)]
    category: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<&Favorite> for FavoriteDoc {
    fn from(favorite: &Favorite) -> Self {
        Self {
            id: favorite.id.as_str(),
            user_id: favorite.user_id.clone(),
            place_id: favorite.place_id.clone(),
            place_name: favorite.place_name.clone(),
            category: favorite.category.clone(),
            created_at: favorite.created_at,
            updated_at: favorite.updated_at,
        }
    }
}

impl TryFrom<FavoriteDoc> for Favorite {
    type Error = GatewayError;

    fn try_from(doc: FavoriteDoc) -> GatewayResult<Self> {
        Ok(Self {
            id: doc.id.parse().map_err(|_| {
                GatewayError::InvalidDocument(format!("favorite id {:?} is not a uuid", doc.id))
            })?,
            user_id: doc.user_id,
            place_id: doc.place_id,
            place_name: doc.place_name,
            category: doc.category,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            // A document that exists remotely is by definition replicated
            synced: true,
        })
    }
}

/// Remote gateway for the favorites collection
#[derive(Debug, Clone)]
pub struct FavoriteGateway {
    client: DocStoreClient,
}

impl FavoriteGateway {
    /// Create a gateway over the shared document-store client
    pub const fn new(client: DocStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SyncGateway<Favorite> for FavoriteGateway {
    async fn upload(&self, record: &Favorite) -> GatewayResult<()> {
        self.client
            .put_doc(COLLECTION, &record.id.as_str(), &FavoriteDoc::from(record))
            .await
    }

    async fn upload_batch(&self, records: &[Favorite]) -> GatewayResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let docs: Vec<FavoriteDoc> = records.iter().map(FavoriteDoc::from).collect();
        self.client.post_batch(COLLECTION, &docs).await
    }

    async fn delete(&self, id: &str) -> GatewayResult<()> {
        self.client.delete_doc(COLLECTION, id).await
    }

    async fn query_by_owner(&self, owner_key: &str) -> GatewayResult<Vec<Favorite>> {
        let documents = self
            .client
            .query_docs(COLLECTION, &[("owner", owner_key.to_string())])
            .await?;
        Ok(decode_documents::<FavoriteDoc, Favorite>(COLLECTION, documents))
    }

    async fn query_recent(&self, limit: usize) -> GatewayResult<Vec<Favorite>> {
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
        Ok(decode_documents::<FavoriteDoc, Favorite>(COLLECTION, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;
    use std::time::Duration;

    #[test]
    fn doc_round_trip_preserves_fields() {
        let favorite = Favorite::new("user-1", "place-9", "Senso-ji", Some("temple".to_string()));
        let doc = FavoriteDoc::from(&favorite);
        let encoded = serde_json::to_value(&doc).unwrap();

        assert!(encoded.get("synced").is_none());

        let decoded: FavoriteDoc = serde_json::from_value(encoded).unwrap();
        let restored = Favorite::try_from(decoded).unwrap();
        assert_eq!(restored.id, favorite.id);
        assert_eq!(restored.place_name, "Senso-ji");
        assert_eq!(restored.category.as_deref(), Some("temple"));
        assert!(restored.synced);
    }

    #[test]
    fn decode_documents_skips_malformed_entries() {
        let good = Favorite::new("user-1", "place-1", "Harbor", None);
        let documents = vec![
            serde_json::to_value(FavoriteDoc::from(&good)).unwrap(),
            json!({"id": "not-a-uuid", "user_id": "u", "place_id": "p",
                   "place_name": "x", "created_at": 1, "updated_at": 1}),
            json!({"unexpected": "shape"}),
        ];

        let decoded = decode_documents::<FavoriteDoc, Favorite>(COLLECTION, documents);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, good.id);
    }

    /// Integration test against a live document store - only runs if env vars are set
    /// Run with: ROAM_REMOTE_URL=... cargo test test_round_trip_with_remote_store -- --ignored
    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires ROAM_REMOTE_URL"]
    async fn test_round_trip_with_remote_store() {
        let base_url = env::var("ROAM_REMOTE_URL").expect("ROAM_REMOTE_URL must be set");
        let api_key = env::var("ROAM_API_KEY").ok();
        let client = DocStoreClient::new(base_url, api_key, Duration::from_secs(10)).unwrap();
        let gateway = FavoriteGateway::new(client);

        let favorite = Favorite::new("roam-test-user", "place-1", "Test place", None);
        gateway.upload(&favorite).await.unwrap();

        let fetched = gateway.query_by_owner("roam-test-user").await.unwrap();
        assert!(fetched.iter().any(|f| f.id == favorite.id));

        gateway.delete(&favorite.id.as_str()).await.unwrap();
    }
}
