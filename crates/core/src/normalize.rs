//! Converts stored request documents of any vintage into the canonical [`AssetRequest`].
//!
//! Normalization never fails. Missing or malformed fields are replaced with defaults, and
//! the output re-normalizes to itself.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::domain::{
    fields, Approval, ApprovalStatus, Approver, AssetRequest, FulfillmentDetail, Item, ItemStatus,
    Priority, RequestCode, RequestId, RequestStatus, Urgency, DEFAULT_APPROVER_ROLE,
};
use crate::store::Document;

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn normalize_document(document: &Document) -> AssetRequest {
    normalize_request_at(&document.id, &document.data, Utc::now())
}

/// `now` only seeds `approval.requestedAt` when an approval chain has to be synthesized.
pub fn normalize_request_at(id: &str, raw: &Value, now: DateTime<Utc>) -> AssetRequest {
    let canonical = canonicalize(raw.clone());
    let empty = Map::new();
    let record = canonical.as_object().unwrap_or(&empty);
    let requester = nested(record, "requester");
    let location = nested(record, "location");

    AssetRequest {
        id: RequestId(id.to_string()),
        code: RequestCode(text(record, fields::REQUEST_CODE).unwrap_or_default()),
        requester_id: text(record, fields::REQUESTER_ID)
            .or_else(|| requester.and_then(|r| text(r, "id").or_else(|| text(r, "uid"))))
            .unwrap_or_default(),
        requester_name: text(record, fields::REQUESTER_NAME)
            .or_else(|| requester.and_then(|r| text(r, "name").or_else(|| text(r, "displayName"))))
            .unwrap_or_default(),
        requester_email: text(record, fields::REQUESTER_EMAIL)
            .or_else(|| requester.and_then(|r| text(r, "email")))
            .unwrap_or_default(),
        location_id: text(record, fields::LOCATION_ID)
            .or_else(|| location.and_then(|l| text(l, "id")))
            .unwrap_or_default(),
        location_name: text(record, fields::LOCATION_NAME)
            .or_else(|| location.and_then(|l| text(l, "name")))
            .unwrap_or_default(),
        department: text(record, fields::DEPARTMENT).unwrap_or_default(),
        status: text(record, fields::STATUS)
            .and_then(|value| value.parse::<RequestStatus>().ok())
            .unwrap_or(RequestStatus::Pending),
        priority: text(record, fields::PRIORITY)
            .and_then(|value| value.parse::<Priority>().ok())
            .unwrap_or(Priority::Medium),
        items: match record.get(fields::ITEMS) {
            Some(Value::Array(items)) => items.iter().map(normalize_item).collect(),
            _ => Vec::new(),
        },
        approval: normalize_approval(record.get(fields::APPROVAL), now),
        notes: text(record, fields::NOTES),
        needed_by: date(record, fields::NEEDED_BY),
        expected_duration: count(record, fields::EXPECTED_DURATION).unwrap_or(0),
        rejection_reason: text(record, fields::REJECTION_REASON),
        created_at: date(record, fields::CREATED_AT),
        updated_at: date(record, fields::UPDATED_AT),
    }
}

/// Walks objects and arrays at every depth and rewrites native timestamp and date objects
/// into canonical RFC 3339 strings.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if is_date_object(&map) {
                if let Some(date) = decode_date_object(&map) {
                    return Value::String(format_date(date));
                }
            }
            Value::Object(map.into_iter().map(|(key, value)| (key, canonicalize(value))).collect())
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Tries, in order: native timestamp object, native date (object or epoch millis), string.
pub fn decode_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => decode_date_object(map),
        Value::Number(number) => from_epoch_millis(number),
        Value::String(text) => parse_date_str(text),
        _ => None,
    }
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_date_object(map: &Map<String, Value>) -> Option<DateTime<Utc>> {
    decode_timestamp(map).or_else(|| match map.get("$date")? {
        Value::Number(number) => from_epoch_millis(number),
        Value::String(text) => parse_date_str(text),
        _ => None,
    })
}

fn decode_timestamp(map: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
    let nanos = map
        .get("nanoseconds")
        .or_else(|| map.get("_nanoseconds"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
}

fn is_date_object(map: &Map<String, Value>) -> bool {
    const TIMESTAMP_KEYS: [&str; 4] = ["seconds", "nanoseconds", "_seconds", "_nanoseconds"];

    let timestamp = (map.contains_key("seconds") || map.contains_key("_seconds"))
        && map.keys().all(|key| TIMESTAMP_KEYS.contains(&key.as_str()));
    timestamp || (map.len() == 1 && map.contains_key("$date"))
}

fn from_epoch_millis(number: &Number) -> Option<DateTime<Utc>> {
    let millis = match number.as_i64() {
        Some(millis) => millis,
        None => {
            let millis = number.as_f64()?;
            if !millis.is_finite() {
                return None;
            }
            millis.round() as i64
        }
    };
    DateTime::from_timestamp_millis(millis)
}

fn parse_date_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalize_item(value: &Value) -> Item {
    let Value::Object(map) = value else {
        // Keep the slot so positional item ids stay stable.
        return Item {
            asset_type: value.as_str().unwrap_or_default().to_string(),
            category: String::new(),
            quantity: 1,
            item_status: ItemStatus::Pending,
            purpose: None,
            specifications: BTreeMap::new(),
            urgency: None,
            fulfillment_details: Vec::new(),
        };
    };

    Item {
        asset_type: text(map, "assetType").unwrap_or_default(),
        category: text(map, "category").unwrap_or_default(),
        quantity: count(map, "quantity").filter(|quantity| *quantity >= 1).unwrap_or(1),
        item_status: text(map, "itemStatus")
            .map(|status| ItemStatus::parse_lenient(&status))
            .unwrap_or(ItemStatus::Pending),
        purpose: text(map, "purpose"),
        specifications: match map.get("specifications") {
            Some(Value::Object(specs)) => specs
                .iter()
                .filter_map(|(key, value)| scalar_text(value).map(|value| (key.clone(), value)))
                .collect(),
            _ => BTreeMap::new(),
        },
        urgency: text(map, "urgency").and_then(|urgency| Urgency::parse(&urgency)),
        fulfillment_details: match map.get("fulfillmentDetails") {
            Some(Value::Array(details)) => details.iter().filter_map(normalize_detail).collect(),
            _ => Vec::new(),
        },
    }
}

fn normalize_detail(value: &Value) -> Option<FulfillmentDetail> {
    let map = value.as_object()?;
    let quantity = count(map, "quantity").filter(|quantity| *quantity >= 1)?;
    Some(FulfillmentDetail {
        fulfilled_by: text(map, "fulfilledBy").unwrap_or_default(),
        fulfilled_at: date(map, "fulfilledAt"),
        quantity,
        notes: text(map, "notes"),
    })
}

fn normalize_approval(value: Option<&Value>, now: DateTime<Utc>) -> Approval {
    let Some(Value::Object(map)) = value else {
        return Approval::default_chain(now);
    };

    let approvers: Vec<Approver> = match map.get("approvers") {
        Some(Value::Array(list)) => list.iter().map(normalize_approver).collect(),
        _ => Vec::new(),
    };
    let synthesized = approvers.is_empty();
    let status = text(map, "status")
        .and_then(|status| status.parse::<ApprovalStatus>().ok())
        .unwrap_or(ApprovalStatus::Pending);

    // A synthesized admin inherits a stored approval so the chain agrees with `status`.
    let approvers = if synthesized {
        let mut admin = Approver::pending(DEFAULT_APPROVER_ROLE);
        admin.approved = status == ApprovalStatus::Approved;
        vec![admin]
    } else {
        approvers
    };

    Approval {
        approvers,
        current_approver_index: count(map, "currentApproverIndex").unwrap_or(0),
        requested_at: date(map, "requestedAt").or(synthesized.then_some(now)),
        status,
        rejected_by: text(map, "rejectedBy"),
        rejected_at: date(map, "rejectedAt"),
        reason: text(map, "reason"),
    }
}

fn normalize_approver(value: &Value) -> Approver {
    match value {
        Value::Object(map) => Approver {
            role: text(map, "role").unwrap_or_default(),
            required: flag(map, "required").unwrap_or(true),
            approved: flag(map, "approved").unwrap_or(false),
        },
        other => Approver::pending(other.as_str().unwrap_or_default()),
    }
}

fn nested<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    record.get(key).and_then(Value::as_object)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Non-empty text; numbers are rendered so legacy numeric codes survive.
fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn count(map: &Map<String, Value>, key: &str) -> Option<u32> {
    match map.get(key)? {
        Value::Number(number) => match number.as_u64() {
            Some(value) => u32::try_from(value).ok(),
            None => number
                .as_f64()
                .filter(|value| value.is_finite() && *value >= 0.0 && value.fract() == 0.0)
                .and_then(|value| u32::try_from(value as u64).ok()),
        },
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_i64().map(|value| value != 0),
        _ => None,
    }
}

fn date(map: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    map.get(key).and_then(decode_date)
}
