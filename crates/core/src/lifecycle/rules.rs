use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{
    fields, Approval, ApprovalStatus, AssetRequest, FulfillmentDetail, Item, ItemStatus, Priority,
    RequestCode, RequestId, RequestStatus, Urgency, DEFAULT_APPROVER_ROLE,
};
use crate::errors::LifecycleError;
use crate::normalize::{decode_date, format_date};

/// Fields a patch may never touch.
pub const IMMUTABLE_FIELDS: [&str; 3] = [fields::ID, fields::REQUEST_CODE, fields::CREATED_AT];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub asset_type: String,
    #[serde(default)]
    pub category: String,
    pub quantity: u32,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub requester_id: String,
    pub requester_name: String,
    #[serde(default)]
    pub requester_email: String,
    pub location_id: String,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub items: Vec<NewItem>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Accepts any of the stored date encodings.
    #[serde(default)]
    pub needed_by: Option<Value>,
    #[serde(default)]
    pub expected_duration: Option<u32>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFulfillment {
    /// Stringified position of the item in the request.
    pub item_id: String,
    pub fulfilled_quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentInput {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemFulfillment>,
}

pub fn generate_request_code<R: Rng + ?Sized>(year: i32, rng: &mut R) -> RequestCode {
    RequestCode(format!("REQ-{year}-{:03}", rng.gen_range(0..1000)))
}

pub fn validate_new_request(input: &NewRequest) -> Result<(), LifecycleError> {
    if input.requester_id.trim().is_empty() {
        return Err(LifecycleError::Validation("requesterId is required".to_string()));
    }
    if input.location_id.trim().is_empty() {
        return Err(LifecycleError::Validation("locationId is required".to_string()));
    }
    if input.items.is_empty() {
        return Err(LifecycleError::Validation("at least one item is required".to_string()));
    }
    for (index, item) in input.items.iter().enumerate() {
        if item.asset_type.trim().is_empty() {
            return Err(LifecycleError::Validation(format!("items[{index}].assetType is required")));
        }
        if item.quantity == 0 {
            return Err(LifecycleError::Validation(format!(
                "items[{index}].quantity must be a positive integer"
            )));
        }
    }
    Ok(())
}

/// A new request starts `pending` with the default admin approval chain. The id is empty
/// until the store assigns one.
pub fn build_request(
    input: NewRequest,
    code: RequestCode,
    now: DateTime<Utc>,
) -> Result<AssetRequest, LifecycleError> {
    validate_new_request(&input)?;

    Ok(AssetRequest {
        id: RequestId::default(),
        code,
        requester_id: input.requester_id,
        requester_name: input.requester_name,
        requester_email: input.requester_email,
        location_id: input.location_id,
        location_name: input.location_name,
        department: input.department,
        status: RequestStatus::Pending,
        priority: input.priority,
        items: input
            .items
            .into_iter()
            .map(|item| Item {
                asset_type: item.asset_type,
                category: item.category,
                quantity: item.quantity,
                item_status: ItemStatus::Pending,
                purpose: item.purpose.filter(|purpose| !purpose.is_empty()),
                specifications: item.specifications,
                urgency: item.urgency,
                fulfillment_details: Vec::new(),
            })
            .collect(),
        approval: Approval::default_chain(now),
        notes: input.notes.filter(|notes| !notes.is_empty()),
        needed_by: input.needed_by.as_ref().and_then(decode_date),
        expected_duration: input.expected_duration.unwrap_or(0),
        rejection_reason: None,
        created_at: Some(now),
        updated_at: Some(now),
    })
}

pub fn request_code_for(now: DateTime<Utc>) -> RequestCode {
    generate_request_code(now.year(), &mut rand::thread_rng())
}

/// Marks every `admin` approver as approved, whatever its chain position, and re-derives
/// the chain status. Returns the request status to write.
pub fn approve_chain(approval: &mut Approval) -> RequestStatus {
    for approver in approval.approvers.iter_mut().filter(|a| a.role == DEFAULT_APPROVER_ROLE) {
        approver.approved = true;
    }

    if approval.all_required_approved() {
        approval.status = ApprovalStatus::Approved;
        RequestStatus::Approved
    } else {
        approval.status = ApprovalStatus::Pending;
        RequestStatus::UnderReview
    }
}

/// The approval object written on rejection. It replaces the stored chain, so prior
/// approver entries are not kept.
pub fn rejection_approval(reason: &str, rejected_by: &str, now: DateTime<Utc>) -> Value {
    json!({
        "status": ApprovalStatus::Rejected.as_str(),
        "rejectedAt": format_date(now),
        "rejectedBy": rejected_by,
        "reason": reason,
    })
}

/// Appends a fulfilment record to every referenced item and re-derives the statuses of the
/// touched items. Validates every reference before mutating anything.
pub fn apply_fulfillment(
    items: &mut [Item],
    input: &FulfillmentInput,
    fulfilled_by: &str,
    now: DateTime<Utc>,
) -> Result<RequestStatus, LifecycleError> {
    if input.items.is_empty() {
        return Err(LifecycleError::Validation("no items to fulfill".to_string()));
    }

    let mut targets = Vec::with_capacity(input.items.len());
    for entry in &input.items {
        let index = entry
            .item_id
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|index| *index < items.len())
            .ok_or_else(|| {
                LifecycleError::Validation(format!("unknown itemId `{}`", entry.item_id))
            })?;
        if entry.fulfilled_quantity == 0 {
            return Err(LifecycleError::Validation(format!(
                "fulfilledQuantity for item `{}` must be a positive integer",
                entry.item_id
            )));
        }
        targets.push((index, entry));
    }

    for (index, entry) in targets {
        let item = &mut items[index];
        item.fulfillment_details.push(FulfillmentDetail {
            fulfilled_by: fulfilled_by.to_string(),
            fulfilled_at: Some(now),
            quantity: entry.fulfilled_quantity,
            notes: entry.notes.clone().or_else(|| input.notes.clone()).filter(|n| !n.is_empty()),
        });
        item.item_status =
            if item.is_fully_fulfilled() { ItemStatus::Fulfilled } else { ItemStatus::Partial };
    }

    Ok(derive_fulfillment_status(items))
}

pub fn derive_fulfillment_status(items: &[Item]) -> RequestStatus {
    if items.iter().all(Item::is_fully_fulfilled) {
        RequestStatus::Fulfilled
    } else {
        RequestStatus::PartiallyFulfilled
    }
}

/// Strips immutable fields, checks and canonicalizes enumerated values, and stamps
/// `updatedAt`.
pub fn sanitize_patch(patch: Value, now: DateTime<Utc>) -> Result<Map<String, Value>, LifecycleError> {
    let Value::Object(mut patch) = patch else {
        return Err(LifecycleError::Validation("update must be a JSON object".to_string()));
    };

    for field in IMMUTABLE_FIELDS {
        patch.remove(field);
    }

    // Stored in canonical spelling so store-side predicates match.
    if let Some(status) = patch.get(fields::STATUS) {
        let status = status.as_str().unwrap_or_default().parse::<RequestStatus>()?;
        patch.insert(fields::STATUS.to_string(), Value::String(status.as_str().to_string()));
    }
    if let Some(priority) = patch.get(fields::PRIORITY) {
        let priority = priority.as_str().unwrap_or_default().parse::<Priority>()?;
        patch.insert(fields::PRIORITY.to_string(), Value::String(priority.as_str().to_string()));
    }

    patch.insert(fields::UPDATED_AT.to_string(), Value::String(format_date(now)));
    Ok(patch)
}
