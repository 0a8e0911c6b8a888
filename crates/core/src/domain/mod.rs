pub mod approval;
pub mod request;

pub use approval::{Approval, ApprovalStatus, Approver, DEFAULT_APPROVER_ROLE};
pub use request::{
    fields, AssetRequest, FulfillmentDetail, Item, ItemStatus, Priority, RequestCode, RequestId,
    RequestStatus, Urgency,
};
