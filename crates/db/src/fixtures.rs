//! Demo dataset covering every stored encoding the normalizer accepts, so a fresh
//! database exercises legacy records alongside canonical ones.

use assetflow_core::store::StoreError;
use serde::Serialize;
use serde_json::{json, Value};

use crate::store::SqlDocumentStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub collection: String,
    pub inserted: usize,
    pub ids: Vec<String>,
}

pub struct SeedDataset;

impl SeedDataset {
    pub fn documents() -> Vec<(&'static str, Value)> {
        vec![
            (
                "seed-canonical-pending",
                json!({
                    "requestId": "REQ-2026-101",
                    "requesterId": "user-ana",
                    "requesterName": "Ana Ruiz",
                    "requesterEmail": "ana@example.org",
                    "locationId": "loc-hq",
                    "locationName": "Headquarters",
                    "department": "IT",
                    "status": "pending",
                    "priority": "high",
                    "items": [
                        {"assetType": "Laptop", "category": "Computers", "quantity": 2, "itemStatus": "pending"},
                        {"assetType": "Docking Station", "category": "Peripherals", "quantity": 2}
                    ],
                    "approval": {
                        "approvers": [{"role": "admin", "required": true, "approved": false}],
                        "currentApproverIndex": 0,
                        "requestedAt": "2026-03-02T09:00:00Z",
                        "status": "pending"
                    },
                    "expectedDuration": 30,
                    "createdAt": "2026-03-02T09:00:00Z",
                    "updatedAt": "2026-03-02T09:00:00Z"
                }),
            ),
            (
                "seed-native-timestamps",
                json!({
                    "requestId": "REQ-2026-102",
                    "requesterId": "user-ben",
                    "requesterName": "Ben Okafor",
                    "locationId": "loc-warehouse",
                    "locationName": "North Warehouse",
                    "department": "Operations",
                    "status": "approved",
                    "priority": "urgent",
                    "items": [
                        {"assetType": "Pallet Jack", "category": "Vehicles", "quantity": "3",
                         "urgency": "urgent", "specifications": {"capacityKg": 2500, "electric": true}}
                    ],
                    "approval": {
                        "approvers": [{"role": "admin", "required": true, "approved": "true"}],
                        "requestedAt": {"seconds": 1772182800, "nanoseconds": 0},
                        "status": "approved"
                    },
                    "neededBy": {"$date": 1775001600000_i64},
                    "createdAt": {"seconds": 1772182800, "nanoseconds": 0},
                    "updatedAt": {"_seconds": 1772269200, "_nanoseconds": 500000000}
                }),
            ),
            (
                "seed-partially-fulfilled",
                json!({
                    "requestId": "REQ-2026-103",
                    "requesterId": "user-cy",
                    "requesterName": "Cy Tanaka",
                    "locationId": "loc-warehouse",
                    "department": "Lab",
                    "status": "partially_fulfilled",
                    "priority": "medium",
                    "items": [
                        {"assetType": "Microscope", "category": "Optics", "quantity": 3, "itemStatus": "partial",
                         "fulfillmentDetails": [
                             {"fulfilledBy": "fac-dee", "fulfilledAt": "2026-02-20 14:30:00", "quantity": 1}
                         ]},
                        {"assetType": "Slide Kit", "category": "Consumables", "quantity": 1, "itemStatus": "fulfilled",
                         "fulfillmentDetails": [
                             {"fulfilledBy": "fac-dee", "fulfilledAt": "2026-02-20", "quantity": 1}
                         ]}
                    ],
                    "approval": {
                        "approvers": [{"role": "admin", "required": true, "approved": true}],
                        "status": "approved"
                    },
                    "createdAt": "2026-02-10T08:15:00",
                    "updatedAt": "2026-02-20T14:30:00Z"
                }),
            ),
            (
                "seed-legacy-rejected",
                json!({
                    "requestId": "REQ-2025-904",
                    "requester": {"uid": "user-dana", "displayName": "Dana Whit", "email": "dana@example.org"},
                    "location": {"id": "loc-hq", "name": "Headquarters"},
                    "department": "Finance",
                    "status": "rejected",
                    "priority": "critical",
                    "items": ["Standing Desk"],
                    "approval": {
                        "status": "rejected",
                        "rejectedBy": "admin-root",
                        "rejectedAt": "2025-12-01T10:00:00Z",
                        "reason": "Budget frozen"
                    },
                    "rejectionReason": "Budget frozen",
                    "createdAt": "2025-11-28"
                }),
            ),
            (
                "seed-undated-draft",
                json!({
                    "requesterId": "user-eli",
                    "requesterName": "Eli Brand",
                    "locationId": "loc-annex",
                    "status": "draft",
                    "items": [{"assetType": "Projector", "quantity": 0, "itemStatus": "shipped"}],
                    "expectedDuration": "five"
                }),
            ),
        ]
    }

    pub async fn load(store: &SqlDocumentStore, collection: &str) -> Result<SeedResult, StoreError> {
        let documents = Self::documents();
        let mut ids = Vec::with_capacity(documents.len());
        for (id, data) in &documents {
            store.put(collection, id, data).await?;
            ids.push((*id).to_string());
        }

        tracing::info!(
            event_name = "store.seeded",
            collection,
            inserted = ids.len(),
            "seed documents written"
        );
        Ok(SeedResult { collection: collection.to_string(), inserted: ids.len(), ids })
    }
}
