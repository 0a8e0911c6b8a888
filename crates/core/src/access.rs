//! Role-scoped entry points over one shared [`RequestLifecycle`].
//!
//! Reads return typed results. The `*_or_empty` adapters keep the "failed read shows no
//! rows" behavior for display callers and log the failure. Mutations never return `Err`:
//! they report through [`OperationResult`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{ActorContext, AuditSink};
use crate::config::AppConfig;
use crate::domain::{AssetRequest, RequestStatus};
use crate::errors::{ErrorClass, LifecycleError};
use crate::filter::{FilterSpec, QueryPlan};
use crate::lifecycle::{FulfillmentInput, NewRequest, RequestLifecycle};
use crate::store::DocumentStore;

const OPEN_STATUSES: [RequestStatus; 2] = [RequestStatus::Pending, RequestStatus::UnderReview];
const AWAITING_FULFILLMENT: [RequestStatus; 2] =
    [RequestStatus::Approved, RequestStatus::PartiallyFulfilled];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
            error_class: None,
        }
    }

    pub fn failed(error: &LifecycleError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.user_message().to_string()),
            error: Some(error.to_string()),
            error_class: Some(error.class()),
        }
    }

    fn from_result(result: Result<T, LifecycleError>, message: &str) -> Self {
        match result {
            Ok(data) => Self::ok(data, message),
            Err(error) => Self::failed(&error),
        }
    }
}

/// Both facades, built once at start-up and handed to callers.
pub struct RequestServices<S: ?Sized> {
    pub admin: AdminRequestService<S>,
    pub facilitator: FacilitatorRequestService<S>,
}

impl<S> RequestServices<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: &AppConfig) -> Self {
        Self::from_lifecycle(RequestLifecycle::new(store, config.lifecycle_settings()))
    }

    pub fn with_audit_sink(store: Arc<S>, config: &AppConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self::from_lifecycle(
            RequestLifecycle::new(store, config.lifecycle_settings()).with_audit_sink(audit),
        )
    }

    pub fn from_lifecycle(lifecycle: RequestLifecycle<S>) -> Self {
        let lifecycle = Arc::new(lifecycle);
        Self {
            admin: AdminRequestService { lifecycle: lifecycle.clone() },
            facilitator: FacilitatorRequestService { lifecycle },
        }
    }
}

pub struct AdminRequestService<S: ?Sized> {
    lifecycle: Arc<RequestLifecycle<S>>,
}

impl<S> AdminRequestService<S>
where
    S: DocumentStore + ?Sized,
{
    pub async fn get_requests(&self, filter: &FilterSpec) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.lifecycle.find(&QueryPlan::for_admin(filter)).await
    }

    pub async fn get_requests_or_empty(&self, filter: &FilterSpec) -> Vec<AssetRequest> {
        or_empty("admin.get_requests", self.get_requests(filter).await)
    }

    pub async fn get_request(&self, id: &str) -> Result<Option<AssetRequest>, LifecycleError> {
        self.lifecycle.get(id).await
    }

    /// Pending and under-review requests, newest first.
    pub async fn get_pending_requests(&self) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_requests_by_status(&OPEN_STATUSES).await
    }

    pub async fn get_requests_by_status(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_requests(&FilterSpec::with_status(statuses.iter().copied())).await
    }

    pub async fn get_requests_by_location(
        &self,
        location_id: &str,
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_requests(&FilterSpec {
            location_id: Some(location_id.to_string()),
            ..FilterSpec::default()
        })
        .await
    }

    pub async fn get_requests_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_requests(&FilterSpec { date_from: Some(from), date_to: Some(to), ..FilterSpec::default() })
            .await
    }

    pub async fn create_request(
        &self,
        context: &ActorContext,
        input: NewRequest,
    ) -> OperationResult<AssetRequest> {
        OperationResult::from_result(self.lifecycle.create(context, input).await, "Request created")
    }

    pub async fn approve(&self, context: &ActorContext, id: &str) -> OperationResult<AssetRequest> {
        OperationResult::from_result(self.lifecycle.approve(context, id).await, "Request approved")
    }

    /// A blank reason comes back as a `validation` failure.
    pub async fn reject(
        &self,
        context: &ActorContext,
        id: &str,
        reason: &str,
    ) -> OperationResult<AssetRequest> {
        OperationResult::from_result(
            self.lifecycle.reject(context, id, reason).await,
            "Request rejected",
        )
    }

    /// An empty item list comes back as a `validation` failure.
    pub async fn fulfill(
        &self,
        context: &ActorContext,
        id: &str,
        input: &FulfillmentInput,
    ) -> OperationResult<AssetRequest> {
        OperationResult::from_result(
            self.lifecycle.fulfill(context, id, input).await,
            "Fulfillment recorded",
        )
    }

    pub async fn update(
        &self,
        context: &ActorContext,
        id: &str,
        patch: Value,
    ) -> OperationResult<AssetRequest> {
        OperationResult::from_result(self.lifecycle.update(context, id, patch).await, "Request updated")
    }

    /// `data` is whether a document was actually removed.
    pub async fn delete(&self, context: &ActorContext, id: &str) -> OperationResult<bool> {
        OperationResult::from_result(self.lifecycle.delete(context, id).await, "Request deleted")
    }
}

/// Reads and writes confined to the caller's locations. Requests elsewhere behave as if
/// they did not exist.
pub struct FacilitatorRequestService<S: ?Sized> {
    lifecycle: Arc<RequestLifecycle<S>>,
}

impl<S> FacilitatorRequestService<S>
where
    S: DocumentStore + ?Sized,
{
    pub async fn get_assigned_requests(
        &self,
        location_ids: &[String],
        filter: &FilterSpec,
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        if location_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.lifecycle.find(&QueryPlan::for_locations(location_ids, filter)).await
    }

    pub async fn get_assigned_requests_or_empty(
        &self,
        location_ids: &[String],
        filter: &FilterSpec,
    ) -> Vec<AssetRequest> {
        or_empty("facilitator.get_assigned_requests", self.get_assigned_requests(location_ids, filter).await)
    }

    pub async fn get_request(
        &self,
        location_ids: &[String],
        id: &str,
    ) -> Result<Option<AssetRequest>, LifecycleError> {
        if location_ids.is_empty() {
            return Ok(None);
        }
        let request = self.lifecycle.get(id).await?;
        Ok(request.filter(|request| location_ids.contains(&request.location_id)))
    }

    pub async fn get_pending_for_locations(
        &self,
        location_ids: &[String],
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_assigned_requests(location_ids, &FilterSpec::with_status(OPEN_STATUSES)).await
    }

    /// Approved requests plus those already partially fulfilled.
    pub async fn get_approved_awaiting_fulfillment(
        &self,
        location_ids: &[String],
    ) -> Result<Vec<AssetRequest>, LifecycleError> {
        self.get_assigned_requests(location_ids, &FilterSpec::with_status(AWAITING_FULFILLMENT))
            .await
    }

    pub async fn fulfill(
        &self,
        context: &ActorContext,
        location_ids: &[String],
        id: &str,
        input: &FulfillmentInput,
    ) -> OperationResult<AssetRequest> {
        let result = match self.ensure_in_scope(location_ids, id).await {
            Ok(()) => self.lifecycle.fulfill(context, id, input).await,
            Err(error) => Err(error),
        };
        OperationResult::from_result(result, "Fulfillment recorded")
    }

    /// A patch may not move the request to a location outside the caller's scope.
    pub async fn update(
        &self,
        context: &ActorContext,
        location_ids: &[String],
        id: &str,
        patch: Value,
    ) -> OperationResult<AssetRequest> {
        let moves_out = patch
            .get(crate::domain::fields::LOCATION_ID)
            .is_some_and(|target| !target.as_str().is_some_and(|t| location_ids.iter().any(|l| l == t)));
        let result = if moves_out {
            Err(LifecycleError::Validation(
                "locationId must stay within the assigned locations".to_string(),
            ))
        } else {
            match self.ensure_in_scope(location_ids, id).await {
                Ok(()) => self.lifecycle.update(context, id, patch).await,
                Err(error) => Err(error),
            }
        };
        OperationResult::from_result(result, "Request updated")
    }

    async fn ensure_in_scope(&self, location_ids: &[String], id: &str) -> Result<(), LifecycleError> {
        match self.get_request(location_ids, id).await? {
            Some(_) => Ok(()),
            None => Err(LifecycleError::NotFound(id.to_string())),
        }
    }
}

fn or_empty(operation: &str, result: Result<Vec<AssetRequest>, LifecycleError>) -> Vec<AssetRequest> {
    match result {
        Ok(requests) => requests,
        Err(error) => {
            tracing::error!(
                event_name = "request.read_failed",
                operation,
                error_class = error.class().as_str(),
                error = %error,
                "request read failed; returning empty result"
            );
            Vec::new()
        }
    }
}
