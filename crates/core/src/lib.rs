pub mod access;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod lifecycle;
pub mod normalize;
pub mod store;

pub use access::{
    AdminRequestService, FacilitatorRequestService, OperationResult, RequestServices,
};
pub use audit::{ActorContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::{
    Approval, ApprovalStatus, Approver, AssetRequest, FulfillmentDetail, Item, ItemStatus,
    Priority, RequestCode, RequestId, RequestStatus, Urgency,
};
pub use errors::{DomainError, ErrorClass, LifecycleError};
pub use filter::{FilterSpec, QueryPlan};
pub use lifecycle::{
    FulfillmentInput, ItemFulfillment, LifecycleSettings, NewItem, NewRequest, RequestLifecycle,
};
pub use normalize::{normalize_document, normalize_request_at};
pub use store::{
    Document, DocumentStore, InMemoryDocumentStore, OrderBy, Precondition, Predicate, StoreError,
};
