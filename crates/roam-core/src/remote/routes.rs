//! Travel route gateway and wire format

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{RouteStop, TravelRoute};
use crate::sync::SyncGateway;

use super::{decode_documents, DocStoreClient, GatewayError, GatewayResult};

const COLLECTION: &str = "routes";

/// Wire shape of a route document. Stops are embedded; their order on the
/// wire is irrelevant because each stop carries its position ordinal.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteDoc {
    id: String,
    owner_id: String,
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    stops: Vec<RouteStopDoc>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteStopDoc {
    place_id: String,
    name: String,
    position: i64,
}

impl From<&TravelRoute> for RouteDoc {
    fn from(route: &TravelRoute) -> Self {
        Self {
            id: route.id.as_str(),
            owner_id: route.owner_id.clone(),
            name: route.name.clone(),
            summary: route.summary.clone(),
            stops: route
                .stops
                .iter()
                .map(|stop| RouteStopDoc {
                    place_id: stop.place_id.clone(),
                    name: stop.name.clone(),
                    position: stop.position,
                })
                .collect(),
            created_at: route.created_at,
            updated_at: route.updated_at,
        }
    }
}

impl TryFrom<RouteDoc> for TravelRoute {
    type Error = GatewayError;

    fn try_from(doc: RouteDoc) -> GatewayResult<Self> {
        let mut stops: Vec<RouteStop> = doc
            .stops
            .into_iter()
            .map(|stop| RouteStop {
                place_id: stop.place_id,
                name: stop.name,
                position: stop.position,
            })
            .collect();
        stops.sort_by_key(|stop| stop.position);

        Ok(Self {
            id: doc.id.parse().map_err(|_| {
                GatewayError::InvalidDocument(format!("route id {:?} is not a uuid", doc.id))
            })?,
            owner_id: doc.owner_id,
            name: doc.name,
            summary: doc.summary,
            stops,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            synced: true,
        })
    }
}

/// Remote gateway for the routes collection
#[derive(Debug, Clone)]
pub struct RouteGateway {
    client: DocStoreClient,
}

impl RouteGateway {
    /// Create a gateway over the shared document-store client
    pub const fn new(client: DocStoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SyncGateway<TravelRoute> for RouteGateway {
    async fn upload(&self, record: &TravelRoute) -> GatewayResult<()> {
        self.client
            .put_doc(COLLECTION, &record.id.as_str(), &RouteDoc::from(record))
            .await
    }

    async fn upload_batch(&self, records: &[TravelRoute]) -> GatewayResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let docs: Vec<RouteDoc> = records.iter().map(RouteDoc::from).collect();
        self.client.post_batch(COLLECTION, &docs).await
    }

    async fn delete(&self, id: &str) -> GatewayResult<()> {
        self.client.delete_doc(COLLECTION, id).await
    }

    async fn query_by_owner(&self, owner_key: &str) -> GatewayResult<Vec<TravelRoute>> {
        let documents = self
            .client
            .query_docs(COLLECTION, &[("owner", owner_key.to_string())])
            .await?;
        Ok(decode_documents::<RouteDoc, TravelRoute>(COLLECTION, documents))
    }

    async fn query_recent(&self, limit: usize) -> GatewayResult<Vec<TravelRoute>> {
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
        Ok(decode_documents::<RouteDoc, TravelRoute>(COLLECTION, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_round_trip_orders_stops_by_position() {
        let route = TravelRoute::new(
            "user-1",
            "Day one",
            Some("walking loop".to_string()),
            vec![
                RouteStop::new("p-1", "Old town", 0),
                RouteStop::new("p-2", "Market", 1),
            ],
        );
        let mut doc = RouteDoc::from(&route);
        // Scramble the wire order; position must win on the way back in
        doc.stops.reverse();

        let encoded = serde_json::to_value(&doc).unwrap();
        let decoded: RouteDoc = serde_json::from_value(encoded).unwrap();
        let restored = TravelRoute::try_from(decoded).unwrap();

        assert_eq!(restored.stops[0].name, "Old town");
        assert_eq!(restored.stops[1].name, "Market");
        assert!(restored.synced);
    }

    #[test]
    fn doc_without_stops_decodes_to_empty_route() {
        let id = crate::models::RouteId::new();
        let value = json!({
            "id": id.as_str(),
            "owner_id": "u-1",
            "name": "Empty",
            "created_at": 1,
            "updated_at": 1
        });
        let doc: RouteDoc = serde_json::from_value(value).unwrap();
        let route = TravelRoute::try_from(doc).unwrap();
        assert!(route.stops.is_empty());
        assert!(route.summary.is_none());
    }

    #[test]
    fn decode_documents_skips_bad_route_ids() {
        let good = TravelRoute::new("user-1", "Keeper", None, vec![]);
        let documents = vec![
            serde_json::to_value(RouteDoc::from(&good)).unwrap(),
            json!({"id": "route-1", "owner_id": "u", "name": "bad id",
                   "created_at": 1, "updated_at": 1}),
        ];

        let decoded = decode_documents::<RouteDoc, TravelRoute>(COLLECTION, documents);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "Keeper");
    }
}
