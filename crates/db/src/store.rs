//! SQLite implementation of [`DocumentStore`]: one `documents` table keyed by
//! `(collection, id)` with the JSON body in `data`. Predicates compile to `json_extract`.

use assetflow_core::store::{
    merge_top_level, Document, DocumentStore, OrderBy, Precondition, Predicate, SortDirection,
    StoreError,
};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};
use uuid::Uuid;

use crate::DbPool;

pub struct SqlDocumentStore {
    pool: DbPool,
}

impl SqlDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Inserts or replaces a document under a caller-chosen id.
    pub async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
        )
        .bind(collection)
        .bind(id)
        .bind(encode(data)?)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    pub async fn count(&self, collection: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(encode(&data)?)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(id)
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.map(document_from_row).transpose()
    }

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        let compiled = compile_query(predicates, order_by)?;
        let mut query = sqlx::query(&compiled.sql).bind(collection);
        for value in compiled.binds {
            query = value.bind_to(query);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(unavailable)?;
        rows.into_iter().map(document_from_row).collect()
    }

    /// Read, merge, and write inside one `BEGIN IMMEDIATE` transaction so the precondition
    /// check and the write see the same row. Taking the write lock up front lets concurrent
    /// writers queue on `busy_timeout` instead of failing to upgrade a read lock.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        precondition: Option<&Precondition>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(unavailable)?;

        let raw: Option<String> =
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unavailable)?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound { collection: collection.to_string(), id: id.to_string() });
        };
        let mut stored = decode(&raw)?;

        if let Some(precondition) = precondition {
            if !precondition.holds(&stored) {
                return Err(StoreError::PreconditionFailed {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    field: precondition.field().to_string(),
                });
            }
        }

        merge_top_level(&mut stored, patch);
        sqlx::query("UPDATE documents SET data = ? WHERE collection = ? AND id = ?")
            .bind(encode(&stored)?)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl SqlValue {
    /// `json_extract` yields booleans as 0/1 and composites as minified JSON text.
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Integer(i64::from(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => Self::Integer(integer),
                None => Self::Real(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => Self::Text(text.clone()),
            composite => Self::Text(composite.to_string()),
        }
    }

    fn bind_to<'q>(
        self,
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            Self::Text(text) => query.bind(text),
            Self::Integer(integer) => query.bind(integer),
            Self::Real(real) => query.bind(real),
            Self::Null => query.bind(Option::<String>::None),
        }
    }
}

#[derive(Debug, PartialEq)]
struct CompiledQuery {
    sql: String,
    binds: Vec<SqlValue>,
}

fn compile_query(predicates: &[Predicate], order_by: Option<&OrderBy>) -> Result<CompiledQuery, StoreError> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut binds = Vec::new();

    for predicate in predicates {
        let column = extract(predicate.field())?;
        sql.push_str(" AND ");
        match predicate {
            Predicate::Eq { value: Value::Null, .. } => {
                sql.push_str(&format!("{column} IS NULL"));
            }
            Predicate::Eq { value, .. } => {
                sql.push_str(&format!("{column} = ?"));
                binds.push(SqlValue::from_json(value));
            }
            Predicate::In { values, .. } if values.is_empty() => sql.push_str("0 = 1"),
            Predicate::In { values, .. } => {
                let concrete: Vec<&Value> = values.iter().filter(|value| !value.is_null()).collect();
                let includes_null = concrete.len() < values.len();
                let mut clauses = Vec::new();
                if !concrete.is_empty() {
                    let placeholders = vec!["?"; concrete.len()].join(", ");
                    clauses.push(format!("{column} IN ({placeholders})"));
                    binds.extend(concrete.into_iter().map(SqlValue::from_json));
                }
                if includes_null {
                    clauses.push(format!("{column} IS NULL"));
                }
                sql.push_str(&format!("({})", clauses.join(" OR ")));
            }
            Predicate::Lt { value, .. } => {
                sql.push_str(&format!("{column} < ?"));
                binds.push(SqlValue::from_json(value));
            }
            Predicate::Gt { value, .. } => {
                sql.push_str(&format!("{column} > ?"));
                binds.push(SqlValue::from_json(value));
            }
        }
    }

    match order_by {
        Some(order_by) => {
            let column = extract(&order_by.field)?;
            let direction = match order_by.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {column} IS NULL, {column} {direction}, id"));
        }
        None => sql.push_str(" ORDER BY id"),
    }

    Ok(CompiledQuery { sql, binds })
}

/// Field names are inlined so the expression indexes apply; only plain identifiers pass.
fn extract(field: &str) -> Result<String, StoreError> {
    let plain = !field.is_empty()
        && field.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !plain {
        return Err(StoreError::Decode(format!("unsupported field name `{field}`")));
    }
    Ok(format!("json_extract(data, '$.{field}')"))
}

fn document_from_row(row: SqliteRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id").map_err(|error| StoreError::Decode(error.to_string()))?;
    let raw: String = row.try_get("data").map_err(|error| StoreError::Decode(error.to_string()))?;
    Ok(Document { id, data: decode(&raw)? })
}

fn encode(data: &Value) -> Result<String, StoreError> {
    serde_json::to_string(data).map_err(|error| StoreError::Decode(error.to_string()))
}

fn decode(raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|error| StoreError::Decode(error.to_string()))
}

fn unavailable(error: sqlx::Error) -> StoreError {
    tracing::warn!(event_name = "store.sql_error", error = %error, "sqlite document store call failed");
    StoreError::Unavailable(error.to_string())
}

#[cfg(test)]
mod tests {
    use assetflow_core::store::{DocumentStore, OrderBy, Precondition, Predicate, StoreError};
    use serde_json::{json, Map, Value};

    use super::{compile_query, SqlDocumentStore, SqlValue};
    use crate::{connect_with_settings, migrations::run_pending};

    async fn store() -> SqlDocumentStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlDocumentStore::new(pool)
    }

    fn patch(key: &str, value: Value) -> Map<String, Value> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        patch
    }

    async fn seeded() -> SqlDocumentStore {
        let store = store().await;
        for (id, body) in [
            ("a", json!({"status": "pending", "priority": "urgent", "locationId": "loc-1", "createdAt": "2026-01-01T00:00:00Z"})),
            ("b", json!({"status": "approved", "priority": "low", "locationId": "loc-2", "createdAt": "2026-03-01T00:00:00Z"})),
            ("c", json!({"status": "pending", "priority": "low", "locationId": "loc-1", "createdAt": "2026-02-01T00:00:00Z"})),
            ("d", json!({"status": "pending", "priority": "low", "locationId": "loc-3"})),
        ] {
            store.put("requests", id, &body).await.expect("put");
        }
        store
    }

    fn ids(documents: &[assetflow_core::store::Document]) -> Vec<&str> {
        documents.iter().map(|document| document.id.as_str()).collect()
    }

    #[test]
    fn membership_compiles_to_in_list_and_empty_list_matches_nothing() {
        let compiled = compile_query(
            &[Predicate::one_of("status", ["pending", "approved"]), Predicate::one_of("priority", Vec::<&str>::new())],
            None,
        )
        .expect("compile");

        assert!(compiled.sql.contains("(json_extract(data, '$.status') IN (?, ?))"));
        assert!(compiled.sql.contains("0 = 1"));
        assert_eq!(
            compiled.binds,
            vec![SqlValue::Text("pending".to_string()), SqlValue::Text("approved".to_string())]
        );
    }

    #[test]
    fn odd_field_names_are_refused() {
        let error = compile_query(&[Predicate::eq("status') OR 1=1 --", "x")], None)
            .expect_err("injection attempt");
        assert!(matches!(error, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn query_composes_predicates_and_orders_missing_last() {
        let store = seeded().await;

        let pending = store
            .query("requests", &[Predicate::eq("status", "pending")], Some(&OrderBy::desc("createdAt")))
            .await
            .expect("query");
        assert_eq!(ids(&pending), vec!["c", "a", "d"]);

        let scoped = store
            .query(
                "requests",
                &[Predicate::one_of("locationId", ["loc-1", "loc-2"]), Predicate::eq("priority", "low")],
                Some(&OrderBy::desc("createdAt")),
            )
            .await
            .expect("query");
        assert_eq!(ids(&scoped), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn range_predicates_use_json_values() {
        let store = seeded().await;

        let early = store
            .query(
                "requests",
                &[Predicate::lt("createdAt", "2026-02-15T00:00:00Z")],
                Some(&OrderBy::asc("createdAt")),
            )
            .await
            .expect("query");
        assert_eq!(ids(&early), vec!["a", "c"]);

        let late = store
            .query("requests", &[Predicate::gt("createdAt", "2026-02-15T00:00:00Z")], None)
            .await
            .expect("query");
        assert_eq!(ids(&late), vec!["b"]);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = seeded().await;
        store.put("locations", "a", &json!({"status": "pending"})).await.expect("put");

        assert_eq!(store.count("requests").await.expect("count"), 4);
        assert_eq!(store.count("locations").await.expect("count"), 1);
        let found = store.get_by_id("locations", "a").await.expect("read").expect("present");
        assert_eq!(found.data, json!({"status": "pending"}));
    }

    #[tokio::test]
    async fn update_merges_top_level_keys_only() {
        let store = store().await;
        let id = store
            .create("requests", json!({"status": "pending", "approval": {"status": "pending", "approvers": []}}))
            .await
            .expect("create");

        store
            .update("requests", &id, patch("approval", json!({"status": "rejected"})), None)
            .await
            .expect("update");

        let stored = store.get_by_id("requests", &id).await.expect("read").expect("present");
        assert_eq!(stored.data["status"], "pending");
        assert_eq!(stored.data["approval"], json!({"status": "rejected"}));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = store().await;
        let error = store
            .update("requests", "ghost", patch("status", json!("approved")), None)
            .await
            .expect_err("missing");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_precondition_rolls_back() {
        let store = store().await;
        store.put("requests", "a", &json!({"status": "pending", "updatedAt": "v2"})).await.expect("put");

        let guard = Precondition::FieldEquals { field: "updatedAt".to_string(), value: json!("v1") };
        let error = store
            .update("requests", "a", patch("status", json!("approved")), Some(&guard))
            .await
            .expect_err("stale");
        assert!(matches!(error, StoreError::PreconditionFailed { .. }));

        let fresh = Precondition::FieldEquals { field: "updatedAt".to_string(), value: json!("v2") };
        store
            .update("requests", "a", patch("status", json!("approved")), Some(&fresh))
            .await
            .expect("fresh guard");
        let stored = store.get_by_id("requests", "a").await.expect("read").expect("present");
        assert_eq!(stored.data["status"], "approved");
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let store = seeded().await;
        assert!(store.delete("requests", "a").await.expect("delete"));
        assert!(!store.delete("requests", "a").await.expect("delete again"));
        assert!(store.get_by_id("requests", "a").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn closed_pool_surfaces_as_unavailable() {
        let store = store().await;
        store.pool().close().await;

        let error = store.query("requests", &[], None).await.expect_err("closed");
        assert!(matches!(error, StoreError::Unavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_on_a_file_store_all_land() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("concurrent.db").display());
        let pool = connect_with_settings(&url, 8, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let store = std::sync::Arc::new(SqlDocumentStore::new(pool));
        store.put("requests", "r1", &json!({"status": "pending"})).await.expect("put");

        let writers = (0..16)
            .map(|writer| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update("requests", "r1", patch("notes", json!(format!("writer {writer}"))), None)
                        .await
                })
            })
            .collect::<Vec<_>>();

        for writer in writers {
            writer.await.expect("join").expect("every concurrent update should succeed");
        }

        let stored = store.get_by_id("requests", "r1").await.expect("get").expect("present");
        let notes = stored.data["notes"].as_str().unwrap_or_default();
        assert!(notes.starts_with("writer "), "last writer wins, got `{notes}`");
        assert_eq!(stored.data["status"], "pending");
    }
}
