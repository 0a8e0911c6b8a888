//! Read-modify-write lifecycle operations over a [`DocumentStore`].
//!
//! Every mutation reads the current document, derives a top-level patch, and writes it back.
//! Two writers racing on the same request both succeed and the later patch wins for each
//! key it carries, unless `optimistic_concurrency` is enabled. In that mode the write is
//! conditioned on the `updatedAt` value that was read, and a lost race surfaces as
//! [`LifecycleError::Conflict`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::audit::{ActorContext, AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::domain::{fields, AssetRequest, RequestId, RequestStatus};
use crate::errors::LifecycleError;
use crate::filter::QueryPlan;
use crate::lifecycle::rules::{
    apply_fulfillment, approve_chain, build_request, rejection_approval, request_code_for,
    sanitize_patch, FulfillmentInput, NewRequest,
};
use crate::normalize::{format_date, normalize_document, normalize_request_at};
use crate::store::{merge_top_level, Document, DocumentStore, Precondition};

pub const DEFAULT_COLLECTION: &str = "requests";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub collection: String,
    pub optimistic_concurrency: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { collection: DEFAULT_COLLECTION.to_string(), optimistic_concurrency: false }
    }
}

pub struct RequestLifecycle<S: ?Sized> {
    store: Arc<S>,
    settings: LifecycleSettings,
    audit: Arc<dyn AuditSink>,
}

impl<S: ?Sized> Clone for RequestLifecycle<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), settings: self.settings.clone(), audit: self.audit.clone() }
    }
}

impl<S> RequestLifecycle<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>, settings: LifecycleSettings) -> Self {
        Self { store, settings, audit: Arc::new(TracingAuditSink) }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub async fn get(&self, id: &str) -> Result<Option<AssetRequest>, LifecycleError> {
        let document = self.store.get_by_id(&self.settings.collection, id).await?;
        Ok(document.as_ref().map(normalize_document))
    }

    pub async fn find(&self, plan: &QueryPlan) -> Result<Vec<AssetRequest>, LifecycleError> {
        let documents = self
            .store
            .query(&self.settings.collection, &plan.predicates, Some(&plan.order_by))
            .await?;
        let fetched = documents.len();
        let requests = plan.finish(documents);

        tracing::debug!(
            event_name = "request.query",
            collection = %self.settings.collection,
            pushed_predicates = plan.predicates.len(),
            fetched,
            returned = requests.len(),
            "request query completed"
        );
        Ok(requests)
    }

    pub async fn create(
        &self,
        context: &ActorContext,
        input: NewRequest,
    ) -> Result<AssetRequest, LifecycleError> {
        let result = self.create_inner(input).await;
        let request_id = result.as_ref().ok().map(|request| request.id.clone());
        self.observe(context, request_id, "request.created", AuditCategory::Lifecycle, &result);
        result
    }

    async fn create_inner(&self, input: NewRequest) -> Result<AssetRequest, LifecycleError> {
        let now = Utc::now();
        let mut request = build_request(input, request_code_for(now), now)?;

        let mut data = serde_json::to_value(&request)
            .map_err(|error| LifecycleError::Validation(error.to_string()))?;
        if let Value::Object(record) = &mut data {
            record.remove(fields::ID);
            record.insert(fields::CREATED_AT.to_string(), Value::String(format_date(now)));
            record.insert(fields::UPDATED_AT.to_string(), Value::String(format_date(now)));
        }

        let id = self.store.create(&self.settings.collection, data).await?;
        request.id = RequestId(id);
        Ok(request)
    }

    /// Marks every `admin` approver as approved. Approving an already approved request
    /// rewrites the same state.
    pub async fn approve(
        &self,
        context: &ActorContext,
        id: &str,
    ) -> Result<AssetRequest, LifecycleError> {
        let result = self.approve_inner(id).await;
        self.observe(context, Some(RequestId(id.to_string())), "request.approved", AuditCategory::Approval, &result);
        result
    }

    async fn approve_inner(&self, id: &str) -> Result<AssetRequest, LifecycleError> {
        let (document, current) = self.load(id).await?;
        let now = Utc::now();

        let mut approval = current.approval.clone();
        let status = approve_chain(&mut approval);

        let mut patch = Map::new();
        patch.insert(fields::APPROVAL.to_string(), to_json(&approval)?);
        patch.insert(fields::STATUS.to_string(), Value::String(status.as_str().to_string()));
        self.write(document, current.status, patch, now).await
    }

    /// Refuses a blank or whitespace-only reason with a validation error.
    pub async fn reject(
        &self,
        context: &ActorContext,
        id: &str,
        reason: &str,
    ) -> Result<AssetRequest, LifecycleError> {
        let result = self.reject_inner(context, id, reason).await;
        self.observe(context, Some(RequestId(id.to_string())), "request.rejected", AuditCategory::Approval, &result);
        result
    }

    async fn reject_inner(
        &self,
        context: &ActorContext,
        id: &str,
        reason: &str,
    ) -> Result<AssetRequest, LifecycleError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::Validation("a rejection reason is required".to_string()));
        }

        let (document, current) = self.load(id).await?;
        let now = Utc::now();

        let mut patch = Map::new();
        patch.insert(fields::APPROVAL.to_string(), rejection_approval(reason, &context.actor_id, now));
        patch.insert(
            fields::STATUS.to_string(),
            Value::String(RequestStatus::Rejected.as_str().to_string()),
        );
        patch.insert(fields::REJECTION_REASON.to_string(), Value::String(reason.to_string()));
        self.write(document, current.status, patch, now).await
    }

    /// Refuses an empty item list. Quantities beyond the requested amount are recorded as given.
    pub async fn fulfill(
        &self,
        context: &ActorContext,
        id: &str,
        input: &FulfillmentInput,
    ) -> Result<AssetRequest, LifecycleError> {
        let result = self.fulfill_inner(context, id, input).await;
        self.observe(
            context,
            Some(RequestId(id.to_string())),
            "request.fulfilled",
            AuditCategory::Fulfillment,
            &result,
        );
        result
    }

    async fn fulfill_inner(
        &self,
        context: &ActorContext,
        id: &str,
        input: &FulfillmentInput,
    ) -> Result<AssetRequest, LifecycleError> {
        let (document, current) = self.load(id).await?;
        let now = Utc::now();

        let mut items = current.items.clone();
        let status = apply_fulfillment(&mut items, input, &context.actor_id, now)?;

        let mut patch = Map::new();
        patch.insert(fields::ITEMS.to_string(), to_json(&items)?);
        patch.insert(fields::STATUS.to_string(), Value::String(status.as_str().to_string()));
        self.write(document, current.status, patch, now).await
    }

    /// Shallow merge of a caller-supplied patch. `id`, `requestId`, and `createdAt` are
    /// never written.
    pub async fn update(
        &self,
        context: &ActorContext,
        id: &str,
        patch: Value,
    ) -> Result<AssetRequest, LifecycleError> {
        let result = self.update_inner(id, patch).await;
        self.observe(context, Some(RequestId(id.to_string())), "request.updated", AuditCategory::Lifecycle, &result);
        result
    }

    async fn update_inner(&self, id: &str, patch: Value) -> Result<AssetRequest, LifecycleError> {
        let now = Utc::now();
        let patch = sanitize_patch(patch, now)?;
        let (document, current) = self.load(id).await?;
        self.write(document, current.status, patch, now).await
    }

    /// Unconditional removal. Returns whether a document existed.
    pub async fn delete(&self, context: &ActorContext, id: &str) -> Result<bool, LifecycleError> {
        let result = self
            .store
            .delete(&self.settings.collection, id)
            .await
            .map_err(LifecycleError::from);
        self.observe(context, Some(RequestId(id.to_string())), "request.deleted", AuditCategory::Lifecycle, &result);
        result
    }

    async fn load(&self, id: &str) -> Result<(Document, AssetRequest), LifecycleError> {
        let document = self
            .store
            .get_by_id(&self.settings.collection, id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        let current = normalize_document(&document);
        Ok((document, current))
    }

    /// Stamps `updatedAt`, writes the patch, and returns the request as a subsequent read
    /// would see it.
    async fn write(
        &self,
        document: Document,
        from: RequestStatus,
        mut patch: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<AssetRequest, LifecycleError> {
        let precondition = self.settings.optimistic_concurrency.then(|| Precondition::FieldEquals {
            field: fields::UPDATED_AT.to_string(),
            value: document.data.get(fields::UPDATED_AT).cloned().unwrap_or(Value::Null),
        });

        patch.insert(fields::UPDATED_AT.to_string(), Value::String(format_date(now)));

        if let Some(to) = patch
            .get(fields::STATUS)
            .and_then(Value::as_str)
            .and_then(|status| status.parse::<RequestStatus>().ok())
        {
            if !from.can_transition_to(to) {
                tracing::warn!(
                    event_name = "request.transition_outside_lifecycle",
                    request_id = %document.id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "status change outside the request lifecycle graph"
                );
            }
        }

        self.store
            .update(&self.settings.collection, &document.id, patch.clone(), precondition.as_ref())
            .await?;

        let Document { id, mut data } = document;
        merge_top_level(&mut data, patch);
        Ok(normalize_request_at(&id, &data, now))
    }

    fn observe<T>(
        &self,
        context: &ActorContext,
        request_id: Option<RequestId>,
        event_type: &str,
        category: AuditCategory,
        result: &Result<T, LifecycleError>,
    ) {
        let subject = request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let event = match result {
            Ok(_) => {
                tracing::info!(
                    event_name = event_type,
                    request_id = subject,
                    actor = %context.actor_id,
                    correlation_id = %context.correlation_id,
                    "request lifecycle operation applied"
                );
                AuditEvent::new(request_id, context, event_type, category, AuditOutcome::Success)
            }
            Err(error) => {
                let outcome = match error {
                    LifecycleError::Store(_) => AuditOutcome::Failed,
                    _ => AuditOutcome::Rejected,
                };
                tracing::warn!(
                    event_name = event_type,
                    request_id = subject,
                    actor = %context.actor_id,
                    correlation_id = %context.correlation_id,
                    error_class = error.class().as_str(),
                    error = %error,
                    "request lifecycle operation failed"
                );
                AuditEvent::new(request_id, context, event_type, category, outcome)
                    .with_metadata("error_class", error.class().as_str())
            }
        };
        self.audit.emit(event);
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, LifecycleError> {
    serde_json::to_value(value).map_err(|error| LifecycleError::Validation(error.to_string()))
}
