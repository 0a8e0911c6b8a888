//! The document store seam. Implementations provide create/read/update/delete by id
//! and conjunctive equality, membership and single-field range queries with one sort key.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryDocumentStore;

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Lt { field: String, value: Value },
    Gt { field: String, value: Value },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { field: field.into(), value: value.into() }
    }

    pub fn one_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In { field: field.into(), values: values.into_iter().map(Into::into).collect() }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt { field: field.into(), value: value.into() }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt { field: field.into(), value: value.into() }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. }
            | Self::In { field, .. }
            | Self::Lt { field, .. }
            | Self::Gt { field, .. } => field,
        }
    }

    /// Evaluates the predicate against a document body. A missing field compares as `null`.
    pub fn matches(&self, data: &Value) -> bool {
        let actual = data.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Self::Eq { value, .. } => actual == value,
            Self::In { values, .. } => values.iter().any(|value| value == actual),
            Self::Lt { value, .. } => compare_values(actual, value) == Some(Ordering::Less),
            Self::Gt { value, .. } => compare_values(actual, value) == Some(Ordering::Greater),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    /// Orders two document bodies; documents without the field go last in either direction.
    pub fn compare(&self, left: &Value, right: &Value) -> Ordering {
        let left = left.get(&self.field).filter(|value| !value.is_null());
        let right = right.get(&self.field).filter(|value| !value.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => {
                let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
                match self.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            }
        }
    }
}

/// Compare-and-swap guard for [`DocumentStore::update`].
#[derive(Clone, Debug, PartialEq)]
pub enum Precondition {
    /// The stored top-level field must equal `value` (`null` matches a missing field).
    FieldEquals { field: String, value: Value },
}

impl Precondition {
    pub fn holds(&self, data: &Value) -> bool {
        match self {
            Self::FieldEquals { field, value } => data.get(field).unwrap_or(&Value::Null) == value,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::FieldEquals { field, .. } => field,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document `{id}` not found in `{collection}`")]
    NotFound { collection: String, id: String },
    #[error("precondition on `{field}` failed for `{collection}/{id}`")]
    PreconditionFailed { collection: String, id: String, field: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores `data` under a fresh store-assigned id and returns that id.
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Replaces each top-level key of `patch` in the stored document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        precondition: Option<&Precondition>,
    ) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// Orders scalars of the same JSON type. Mixed or composite values are unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// Shallow merge: every key in `patch` overwrites the stored key wholesale.
pub fn merge_top_level(target: &mut Value, patch: Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}
