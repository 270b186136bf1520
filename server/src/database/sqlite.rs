//! SQLite document store
//!
//! Persistent backend: one `documents` table keyed by (collection, id),
//! with the JSON body stored as text. Merges run inside a transaction so
//! the read-modify-write is atomic.

use super::store::{
    apply_merge, document_version, stamp_new, Document, DocumentStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode(body: &str) -> StoreResult<Document> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> StoreResult<Document> {
        let doc = stamp_new(doc, id);
        let body = serde_json::to_string(&doc)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, version, body, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Inserted {}/{}", collection, id);
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        body.as_deref().map(decode).transpose()
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
        expected_version: Option<u64>,
    ) -> StoreResult<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(body) = body else {
            return Ok(None);
        };

        let mut doc = decode(&body)?;
        let previous = document_version(&doc);
        apply_merge(&mut doc, patch, expected_version)?;
        let version = document_version(&doc);

        let rows = sqlx::query(
            r#"
            UPDATE documents SET body = ?, version = ?, updated_at = ?
            WHERE collection = ? AND id = ? AND version = ?
            "#,
        )
        .bind(serde_json::to_string(&doc)?)
        .bind(version as i64)
        .bind(Utc::now())
        .bind(collection)
        .bind(id)
        .bind(previous as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            // Another writer committed between our read and write
            return Err(StoreError::Conflict {
                expected: previous,
                actual: previous + 1,
            });
        }

        tx.commit().await?;

        tracing::debug!("Merged {}/{} to version {}", collection, id, version);
        Ok(Some(doc))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let bodies: Vec<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? ORDER BY seq ASC")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_pool;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("store.db")).await.unwrap();
        (SqliteStore::new(pool), temp_dir)
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (store, _temp) = create_test_store().await;

        store
            .insert("visitors", "v1", doc(json!({"name": "Ana", "status": "checked_in"})))
            .await
            .unwrap();

        let fetched = store.get("visitors", "v1").await.unwrap().unwrap();
        assert_eq!(fetched["name"], "Ana");
        assert_eq!(document_version(&fetched), 1);

        assert!(store.get("visitors", "v2").await.unwrap().is_none());
        assert!(store.get("users", "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_and_version_check() {
        let (store, _temp) = create_test_store().await;
        store
            .insert("reports", "r1", doc(json!({"status": "pending"})))
            .await
            .unwrap();

        let merged = store
            .merge("reports", "r1", doc(json!({"status": "in_progress"})), Some(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged["status"], "in_progress");
        assert_eq!(document_version(&merged), 2);

        let stale = store
            .merge("reports", "r1", doc(json!({"status": "resolved"})), Some(1))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));

        let fetched = store.get("reports", "r1").await.unwrap().unwrap();
        assert_eq!(fetched["status"], "in_progress");
    }

    #[tokio::test]
    async fn test_merge_missing_returns_none() {
        let (store, _temp) = create_test_store().await;

        let merged = store
            .merge("reports", "nope", doc(json!({"status": "resolved"})), None)
            .await
            .unwrap();

        assert!(merged.is_none());
        assert!(store.list("reports").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let (store, _temp) = create_test_store().await;

        for id in ["z", "m", "a"] {
            store.insert("drills", id, doc(json!({}))).await.unwrap();
        }
        store.insert("users", "u1", doc(json!({}))).await.unwrap();

        let ids: Vec<String> = store
            .list("drills")
            .await
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("persist.db");

        {
            let store = SqliteStore::new(create_pool(&path).await.unwrap());
            store
                .insert("notices", "n1", doc(json!({"title": "Fire drill Friday"})))
                .await
                .unwrap();
        }

        let store = SqliteStore::new(create_pool(&path).await.unwrap());
        let fetched = store.get("notices", "n1").await.unwrap().unwrap();
        assert_eq!(fetched["title"], "Fire drill Friday");
    }
}
