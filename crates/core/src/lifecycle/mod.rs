pub mod engine;
pub mod rules;

pub use engine::{LifecycleSettings, RequestLifecycle, DEFAULT_COLLECTION};
pub use rules::{FulfillmentInput, ItemFulfillment, NewItem, NewRequest};
