use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::Approval;
use crate::errors::DomainError;

/// Store-assigned document key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Human-facing display code, `REQ-<year>-<nnn>`. Not guaranteed unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestCode(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for RequestCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-level document field names shared by the normalizer, the query planner and the
/// lifecycle patches.
pub mod fields {
    pub const ID: &str = "id";
    pub const REQUEST_CODE: &str = "requestId";
    pub const REQUESTER_ID: &str = "requesterId";
    pub const REQUESTER_NAME: &str = "requesterName";
    pub const REQUESTER_EMAIL: &str = "requesterEmail";
    pub const LOCATION_ID: &str = "locationId";
    pub const LOCATION_NAME: &str = "locationName";
    pub const DEPARTMENT: &str = "department";
    pub const STATUS: &str = "status";
    pub const PRIORITY: &str = "priority";
    pub const ITEMS: &str = "items";
    pub const APPROVAL: &str = "approval";
    pub const NOTES: &str = "notes";
    pub const NEEDED_BY: &str = "neededBy";
    pub const EXPECTED_DURATION: &str = "expectedDuration";
    pub const REJECTION_REASON: &str = "rejectionReason";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
    PartiallyFulfilled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        Self::Draft,
        Self::Pending,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::Fulfilled,
        Self::Cancelled,
        Self::PartiallyFulfilled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::PartiallyFulfilled => "partially_fulfilled",
        }
    }

    /// No engine operation is expected to move a request out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Fulfilled | Self::Cancelled)
    }

    /// Whether `next` is an edge of the lifecycle graph. Re-entering the same state is
    /// always allowed so that repeated approvals and fulfilments stay idempotent.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        *self == next
            || matches!(
                (self, next),
                (Draft, Pending)
                    | (Pending, UnderReview)
                    | (Pending, Approved)
                    | (Pending, Rejected)
                    | (UnderReview, Approved)
                    | (UnderReview, Rejected)
                    | (UnderReview, Fulfilled)
                    | (UnderReview, PartiallyFulfilled)
                    | (UnderReview, Cancelled)
                    | (Approved, Fulfilled)
                    | (Approved, PartiallyFulfilled)
                    | (Approved, Cancelled)
                    | (PartiallyFulfilled, Fulfilled)
                    | (PartiallyFulfilled, Cancelled)
            )
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == key).ok_or(
            DomainError::UnknownValue { field: fields::STATUS, value: value.to_string() },
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(DomainError::UnknownValue {
                field: fields::PRIORITY,
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Fulfilled,
    Cancelled,
    Partial,
}

impl ItemStatus {
    /// Unrecognized or missing values fall back to `pending`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "fulfilled" => Self::Fulfilled,
            "cancelled" => Self::Cancelled,
            "partial" => Self::Partial,
            _ => Self::Pending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentDetail {
    pub fulfilled_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub asset_type: String,
    pub category: String,
    pub quantity: u32,
    pub item_status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub specifications: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fulfillment_details: Vec<FulfillmentDetail>,
}

impl Item {
    /// Always re-derived from the fulfilment history, never stored.
    pub fn total_fulfilled(&self) -> u64 {
        self.fulfillment_details.iter().map(|detail| u64::from(detail.quantity)).sum()
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.total_fulfilled() >= u64::from(self.quantity)
    }

    pub fn remaining(&self) -> u64 {
        u64::from(self.quantity).saturating_sub(self.total_fulfilled())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRequest {
    pub id: RequestId,
    #[serde(rename = "requestId")]
    pub code: RequestCode,
    pub requester_id: String,
    pub requester_name: String,
    pub requester_email: String,
    pub location_id: String,
    pub location_name: String,
    pub department: String,
    pub status: RequestStatus,
    pub priority: Priority,
    pub items: Vec<Item>,
    pub approval: Approval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needed_by: Option<DateTime<Utc>>,
    pub expected_duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AssetRequest {
    /// Items are addressed by their position; `item_id` is the stringified index.
    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        item_id.trim().parse::<usize>().ok().filter(|index| *index < self.items.len())
    }

    pub fn all_items_fulfilled(&self) -> bool {
        self.items.iter().all(Item::is_fully_fulfilled)
    }
}
