//! Turns a [`FilterSpec`] into a store query plus a client-side refinement pass.
//!
//! Equality and small-set membership go to the store. Search and the `createdAt` window
//! are applied after normalization, since the store cannot combine arbitrary range and
//! equality predicates in one query. Results are always newest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{fields, AssetRequest, Priority, RequestStatus};
use crate::normalize::normalize_document;
use crate::store::{Document, OrderBy, Predicate};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    pub status: Vec<RequestStatus>,
    pub priority: Vec<Priority>,
    pub location_id: Option<String>,
    pub department: Option<String>,
    pub requester_id: Option<String>,
    pub search_term: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl FilterSpec {
    pub fn with_status(statuses: impl IntoIterator<Item = RequestStatus>) -> Self {
        Self { status: statuses.into_iter().collect(), ..Self::default() }
    }
}

/// Predicates evaluated in-process on canonical requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientRefinement {
    pub statuses: Vec<RequestStatus>,
    pub priorities: Vec<Priority>,
    pub location_id: Option<String>,
    pub department: Option<String>,
    pub requester_id: Option<String>,
    /// Lower-cased, trimmed, never empty.
    pub search_term: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl ClientRefinement {
    pub fn matches(&self, request: &AssetRequest) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&request.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&request.priority) {
            return false;
        }
        if self.location_id.as_ref().is_some_and(|id| *id != request.location_id) {
            return false;
        }
        if self.department.as_ref().is_some_and(|department| *department != request.department) {
            return false;
        }
        if self.requester_id.as_ref().is_some_and(|id| *id != request.requester_id) {
            return false;
        }
        if let Some(term) = &self.search_term {
            if !matches_search(request, term) {
                return false;
            }
        }
        within_window(request.created_at, self.date_from, self.date_to)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub order_by: OrderBy,
    pub refinement: ClientRefinement,
}

impl QueryPlan {
    /// Unrestricted plan: every equality/membership filter is pushed to the store.
    ///
    /// Stored `status`/`priority` are raw values. A document missing the field normalizes
    /// to the default (`pending`/`medium`), so asking for the default also matches a
    /// missing field, and both are re-checked after normalization. Legacy values in other
    /// spellings (`"Approved"`) or unknown values are not matched by the store.
    pub fn for_admin(filter: &FilterSpec) -> Self {
        let mut predicates = Vec::new();
        if !filter.status.is_empty() {
            let values = filter.status.iter().map(|status| status.as_str());
            let missing_is_default = filter.status.contains(&RequestStatus::Pending);
            predicates.push(membership(fields::STATUS, values, missing_is_default));
        }
        if !filter.priority.is_empty() {
            let values = filter.priority.iter().map(|priority| priority.as_str());
            let missing_is_default = filter.priority.contains(&Priority::Medium);
            predicates.push(membership(fields::PRIORITY, values, missing_is_default));
        }
        if let Some(location_id) = non_empty(&filter.location_id) {
            predicates.push(Predicate::eq(fields::LOCATION_ID, location_id));
        }
        if let Some(department) = non_empty(&filter.department) {
            predicates.push(Predicate::eq(fields::DEPARTMENT, department));
        }
        if let Some(requester_id) = non_empty(&filter.requester_id) {
            predicates.push(Predicate::eq(fields::REQUESTER_ID, requester_id));
        }

        Self {
            predicates,
            order_by: OrderBy::desc(fields::CREATED_AT),
            refinement: ClientRefinement {
                statuses: filter.status.clone(),
                priorities: filter.priority.clone(),
                search_term: search_key(&filter.search_term),
                date_from: filter.date_from,
                date_to: filter.date_to,
                ..ClientRefinement::default()
            },
        }
    }

    /// Location-scoped plan: the store sees only `locationId in [...]`; everything else is
    /// refined client-side within that scope.
    pub fn for_locations(location_ids: &[String], filter: &FilterSpec) -> Self {
        Self {
            predicates: vec![Predicate::one_of(
                fields::LOCATION_ID,
                location_ids.iter().map(|id| Value::String(id.clone())),
            )],
            order_by: OrderBy::desc(fields::CREATED_AT),
            refinement: ClientRefinement {
                statuses: filter.status.clone(),
                priorities: filter.priority.clone(),
                location_id: non_empty(&filter.location_id).map(str::to_string),
                department: non_empty(&filter.department).map(str::to_string),
                requester_id: non_empty(&filter.requester_id).map(str::to_string),
                search_term: search_key(&filter.search_term),
                date_from: filter.date_from,
                date_to: filter.date_to,
            },
        }
    }

    /// Normalizes the fetched documents, applies the refinement, and sorts newest first.
    pub fn finish(&self, documents: Vec<Document>) -> Vec<AssetRequest> {
        let mut requests: Vec<AssetRequest> = documents
            .iter()
            .map(normalize_document)
            .filter(|request| self.refinement.matches(request))
            .collect();
        sort_newest_first(&mut requests);
        requests
    }
}

/// Case-insensitive substring match over requester name, request code, department, and
/// every item's asset type or category. `term` must already be lower-cased.
pub fn matches_search(request: &AssetRequest, term: &str) -> bool {
    let contains = |field: &str| field.to_lowercase().contains(term);

    contains(&request.requester_name)
        || contains(&request.code.0)
        || contains(&request.department)
        || request.items.iter().any(|item| contains(&item.asset_type) || contains(&item.category))
}

/// Stable sort by `createdAt` descending; undated requests go last.
pub fn sort_newest_first(requests: &mut [AssetRequest]) {
    requests.sort_by(|left, right| match (left.created_at, right.created_at) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Inclusive on both bounds. With any bound set, undated requests never match.
fn within_window(
    created_at: Option<DateTime<Utc>>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    let Some(created_at) = created_at else {
        return false;
    };
    from.map_or(true, |from| created_at >= from) && to.map_or(true, |to| created_at <= to)
}

fn membership<'a>(
    field: &str,
    values: impl Iterator<Item = &'a str>,
    include_missing: bool,
) -> Predicate {
    let mut values: Vec<Value> = values.map(|value| Value::String(value.to_string())).collect();
    if include_missing {
        values.push(Value::Null);
    }
    Predicate::one_of(field, values)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn search_key(term: &Option<String>) -> Option<String> {
    non_empty(term).map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::{FilterSpec, QueryPlan};
    use crate::domain::{Priority, RequestStatus};
    use crate::store::{Document, Predicate};

    fn doc(id: &str, body: serde_json::Value) -> Document {
        Document { id: id.to_string(), data: body }
    }

    fn sample_documents() -> Vec<Document> {
        vec![
            doc("a", json!({"requestId": "REQ-2026-001", "requesterName": "Ana", "department": "IT",
                            "status": "pending", "priority": "urgent", "locationId": "loc-1",
                            "createdAt": "2026-01-10T00:00:00Z",
                            "items": [{"assetType": "Laptop", "category": "Computers", "quantity": 1}]})),
            doc("b", json!({"requestId": "REQ-2026-002", "requesterName": "Ben", "department": "Ops",
                            "status": "approved", "priority": "low", "locationId": "loc-2",
                            "createdAt": "2026-01-20T00:00:00Z",
                            "items": [{"assetType": "Forklift", "category": "Vehicles", "quantity": 1}]})),
            doc("c", json!({"requestId": "REQ-2026-003", "requesterName": "Cy", "department": "Lab",
                            "status": "pending", "priority": "low", "locationId": "loc-1",
                            "createdAt": "2026-01-15T00:00:00Z",
                            "items": [{"assetType": "Microscope", "category": "Optics", "quantity": 2}]})),
        ]
    }

    #[test]
    fn admin_plan_pushes_membership_and_equality() {
        let plan = QueryPlan::for_admin(&FilterSpec {
            status: vec![RequestStatus::Pending],
            priority: vec![Priority::Urgent, Priority::High],
            department: Some("IT".to_string()),
            search_term: Some("  ".to_string()),
            ..FilterSpec::default()
        });

        assert_eq!(
            plan.predicates,
            vec![
                Predicate::one_of("status", [json!("pending"), Value::Null]),
                Predicate::one_of("priority", ["urgent", "high"]),
                Predicate::eq("department", "IT"),
            ]
        );
        assert_eq!(plan.refinement.search_term, None);
    }

    #[test]
    fn empty_filter_has_no_predicates() {
        let plan = QueryPlan::for_admin(&FilterSpec::default());
        assert!(plan.predicates.is_empty());

        let requests = plan.finish(sample_documents());
        let ids: Vec<&str> = requests.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn search_matches_item_asset_type_case_insensitively() {
        let plan = QueryPlan::for_admin(&FilterSpec {
            search_term: Some("LAP".to_string()),
            ..FilterSpec::default()
        });

        let requests = plan.finish(sample_documents());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id.0, "a");
    }

    #[test]
    fn search_covers_code_department_and_category() {
        for (term, expected) in [("req-2026-002", "b"), ("lab", "c"), ("optic", "c"), ("ana", "a")] {
            let plan = QueryPlan::for_admin(&FilterSpec {
                search_term: Some(term.to_string()),
                ..FilterSpec::default()
            });
            let requests = plan.finish(sample_documents());
            assert_eq!(requests.len(), 1, "term {term}");
            assert_eq!(requests[0].id.0, expected, "term {term}");
        }
    }

    #[test]
    fn date_window_is_inclusive_on_both_ends() {
        let plan = QueryPlan::for_admin(&FilterSpec {
            date_from: Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).single(),
            date_to: Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).single(),
            ..FilterSpec::default()
        });

        let mut documents = sample_documents();
        documents.push(doc("undated", json!({"status": "pending"})));
        let ids: Vec<String> = plan.finish(documents).into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn location_plan_refines_status_and_priority_client_side() {
        let plan = QueryPlan::for_locations(
            &["loc-1".to_string(), "loc-2".to_string()],
            &FilterSpec {
                status: vec![RequestStatus::Pending],
                priority: vec![Priority::Low],
                ..FilterSpec::default()
            },
        );

        assert_eq!(plan.predicates, vec![Predicate::one_of("locationId", ["loc-1", "loc-2"])]);
        let ids: Vec<String> =
            plan.finish(sample_documents()).into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn filter_spec_deserializes_from_camel_case() {
        let filter: FilterSpec = serde_json::from_value(json!({
            "status": ["pending", "under_review"],
            "searchTerm": "desk",
            "dateFrom": "2026-01-01T00:00:00Z"
        }))
        .expect("deserialize");

        assert_eq!(filter.status, vec![RequestStatus::Pending, RequestStatus::UnderReview]);
        assert_eq!(filter.search_term.as_deref(), Some("desk"));
        assert!(filter.date_from.is_some());
    }

    #[test]
    fn admin_status_filter_reaches_documents_without_a_status() {
        let plan = QueryPlan::for_admin(&FilterSpec::with_status([RequestStatus::Pending]));
        let mut documents = sample_documents();
        documents.push(doc("legacy", json!({"createdAt": "2026-01-01T00:00:00Z"})));

        let fetched: Vec<Document> = documents
            .into_iter()
            .filter(|document| plan.predicates.iter().all(|predicate| predicate.matches(&document.data)))
            .collect();
        let ids: Vec<String> = plan.finish(fetched).into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["c", "a", "legacy"]);

        let approved = QueryPlan::for_admin(&FilterSpec::with_status([RequestStatus::Approved]));
        assert_eq!(approved.predicates, vec![Predicate::one_of("status", ["approved"])]);
    }
}
