use std::collections::HashMap;
use std::path::Path;

use sqlx::{SqliteConnection, SqlitePool};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::MemoryError;
use crate::vector_store::{
    BoxFuture, CollectionSpec, ReplaceScope, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, check_dimension, matches_filter, rank, spec_mismatch,
};

type Payload = HashMap<String, serde_json::Value>;

/// Vector index persisted in a single `SQLite` file.
///
/// Vectors are stored as little-endian `f32` blobs and scored in process; the
/// table rowid preserves first-insertion order for tie-breaking.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the index file at `path` and run migrations.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the database cannot be
    /// opened, or migrations fail.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn in_memory() -> Result<Self, MemoryError> {
        let opts = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // Each connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn spec_of(&self, collection: &str) -> Result<Option<CollectionSpec>, sqlx::Error> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT vector_size, embedding_model FROM collections WHERE name = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(size, model)| CollectionSpec {
            vector_size: u64::try_from(size).unwrap_or(0),
            embedding_model: model,
        }))
    }

    async fn load_points(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Vec<f32>, Payload)>, VectorStoreError> {
        let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(
            "SELECT id, vector, payload FROM chunks WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Search(e.to_string()))?;

        rows.into_iter()
            .map(|(id, blob, payload)| {
                let payload: Payload = serde_json::from_str(&payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                Ok((id, decode_vector(&blob)?, payload))
            })
            .collect()
    }
}

async fn write_point(
    conn: &mut SqliteConnection,
    collection: &str,
    point: &VectorPoint,
) -> Result<(), VectorStoreError> {
    let payload = serde_json::to_string(&point.payload)
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    sqlx::query(
        "INSERT INTO chunks (collection, id, vector, payload) VALUES (?, ?, ?, ?) \
         ON CONFLICT(collection, id) DO UPDATE SET \
         vector = excluded.vector, payload = excluded.payload",
    )
    .bind(collection)
    .bind(&point.id)
    .bind(encode_vector(&point.vector))
    .bind(payload)
    .execute(conn)
    .await
    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
    Ok(())
}

async fn create_collection(
    conn: &mut SqliteConnection,
    collection: &str,
    spec: &CollectionSpec,
) -> Result<(), VectorStoreError> {
    let size =
        i64::try_from(spec.vector_size).map_err(|e| VectorStoreError::Collection(e.to_string()))?;
    sqlx::query(
        "INSERT INTO collections (name, vector_size, embedding_model) VALUES (?, ?, ?) \
         ON CONFLICT(name) DO NOTHING",
    )
    .bind(collection)
    .bind(size)
    .bind(&spec.embedding_model)
    .execute(conn)
    .await
    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
    tracing::debug!(%collection, model = %spec.embedding_model, dims = spec.vector_size, "created collection");
    Ok(())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>, VectorStoreError> {
    if blob.len() % 4 != 0 {
        return Err(VectorStoreError::Serialization(format!(
            "vector blob of {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl VectorStore for SqliteVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            if let Some(existing) = self
                .spec_of(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?
            {
                if existing != spec {
                    return Err(spec_mismatch(&collection, &existing, &spec));
                }
                return Ok(());
            }

            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            create_collection(&mut conn, &collection, &spec).await
        })
    }

    fn collection_spec(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<CollectionSpec>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.spec_of(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let spec = self
                .spec_of(&collection)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?
                .ok_or_else(|| {
                    VectorStoreError::Upsert(format!("collection {collection} not found"))
                })?;
            for p in &points {
                check_dimension(&spec, &p.vector)?;
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            for p in &points {
                write_point(&mut tx, &collection, p).await?;
            }
            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let spec = self
                .spec_of(&collection)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?
                .ok_or_else(|| {
                    VectorStoreError::Search(format!("collection {collection} not found"))
                })?;
            check_dimension(&spec, &vector)?;

            let f = filter.unwrap_or_default();
            let candidates = self
                .load_points(&collection)
                .await?
                .into_iter()
                .filter(|(_, _, payload)| matches_filter(payload, &f));
            Ok(rank(&vector, candidates, limit))
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT id, payload FROM chunks WHERE collection = ?")
                    .bind(&collection)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::Delete(e.to_string()))?;

            let mut doomed = Vec::new();
            for (id, payload) in rows {
                let payload: Payload = serde_json::from_str(&payload)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                if matches_filter(&payload, &filter) {
                    doomed.push(id);
                }
            }
            if doomed.is_empty() {
                return Ok(0);
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let mut removed = 0u64;
            for id in &doomed {
                let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                    .bind(&collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                removed += result.rows_affected();
            }
            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            Ok(removed)
        })
    }

    fn replace_points(
        &self,
        collection: &str,
        spec: &CollectionSpec,
        scope: ReplaceScope,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            // Dropping `tx` on any early return rolls the whole swap back.
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;

            let removed = match &scope {
                ReplaceScope::Collection => {
                    let result = sqlx::query("DELETE FROM chunks WHERE collection = ?")
                        .bind(&collection)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                    sqlx::query("DELETE FROM collections WHERE name = ?")
                        .bind(&collection)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                    create_collection(&mut tx, &collection, &spec).await?;
                    result.rows_affected()
                }
                ReplaceScope::Matching(_) => {
                    let existing: Option<(i64, String)> = sqlx::query_as(
                        "SELECT vector_size, embedding_model FROM collections WHERE name = ?",
                    )
                    .bind(&collection)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                    match existing {
                        Some((size, model)) => {
                            let existing = CollectionSpec {
                                vector_size: u64::try_from(size).unwrap_or(0),
                                embedding_model: model,
                            };
                            if existing != spec {
                                return Err(spec_mismatch(&collection, &existing, &spec));
                            }
                        }
                        None => create_collection(&mut tx, &collection, &spec).await?,
                    }

                    let rows: Vec<(String, String)> =
                        sqlx::query_as("SELECT id, payload FROM chunks WHERE collection = ?")
                            .bind(&collection)
                            .fetch_all(&mut *tx)
                            .await
                            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                    let mut removed = 0u64;
                    for (id, payload) in rows {
                        let payload: Payload = serde_json::from_str(&payload)
                            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                        if !scope.covers(&payload) {
                            continue;
                        }
                        let result =
                            sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                                .bind(&collection)
                                .bind(&id)
                                .execute(&mut *tx)
                                .await
                                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                        removed += result.rows_affected();
                    }
                    removed
                }
            };

            for p in &points {
                check_dimension(&spec, &p.vector)?;
                write_point(&mut tx, &collection, p).await?;
            }
            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            Ok(removed)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CollectionSpec {
        CollectionSpec {
            vector_size: 2,
            embedding_model: "test-embed".into(),
        }
    }

    fn point(id: &str, vector: Vec<f32>, source: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([("source".into(), serde_json::json!(source))]),
        }
    }

    #[test]
    fn vector_blob_round_trip() {
        let v = vec![0.5, -1.25, f32::MAX];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
    }

    #[test]
    fn truncated_blob_rejected() {
        assert!(decode_vector(&[0, 0, 0]).is_err());
    }

    #[tokio::test]
    async fn wal_journal_mode_enabled_on_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("index.db"))
            .await
            .unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("variants").join("index.db");
        SqliteVectorStore::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn search_orders_by_score_then_insertion() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0], "x"),
                    point("tie-1", vec![1.0, 0.0], "x"),
                    point("tie-2", vec![3.0, 0.0], "x"),
                ],
            )
            .await
            .unwrap();

        let ids: Vec<String> = store
            .search("c", vec![1.0, 0.0], 3, None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["tie-1", "tie-2", "far"]);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "old")])
            .await
            .unwrap();
        store
            .upsert("c", vec![point("a", vec![0.0, 1.0], "new")])
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        let hits = store.search("c", vec![0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].payload["source"], "new");
    }

    #[tokio::test]
    async fn mismatched_spec_rejected() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        let other = CollectionSpec {
            vector_size: 2,
            embedding_model: "another".into(),
        };
        assert!(store.ensure_collection("c", &other).await.is_err());
    }

    #[tokio::test]
    async fn delete_collection_cascades_to_chunks() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "x")])
            .await
            .unwrap();
        store.delete_collection("c").await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_by_filter_only_touches_matches() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "one.pdf"),
                    point("b", vec![1.0, 0.0], "two.pdf"),
                ],
            )
            .await
            .unwrap();
        let removed = store
            .delete_by_filter("c", VectorFilter::text_eq("source", "one.pdf"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_points_creates_collection_and_swaps_source() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        let source_a = || ReplaceScope::Matching(vec![VectorFilter::text_eq("source", "a")]);
        store
            .replace_points(
                "c",
                &spec(),
                source_a(),
                vec![point("a0", vec![1.0, 0.0], "a"), point("a1", vec![1.0, 0.0], "a")],
            )
            .await
            .unwrap();
        store
            .upsert("c", vec![point("b0", vec![0.0, 1.0], "b")])
            .await
            .unwrap();

        let removed = store
            .replace_points("c", &spec(), source_a(), vec![point("a0", vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_replace_rolls_back_deletes() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        store.ensure_collection("c", &spec()).await.unwrap();
        store
            .upsert(
                "c",
                vec![point("a0", vec![1.0, 0.0], "a"), point("b0", vec![0.0, 1.0], "b")],
            )
            .await
            .unwrap();

        for scope in [
            ReplaceScope::Collection,
            ReplaceScope::Matching(vec![VectorFilter::text_eq("source", "a")]),
        ] {
            // The second point has the wrong width, so the write fails after the delete.
            let result = store
                .replace_points(
                    "c",
                    &spec(),
                    scope,
                    vec![point("a0", vec![1.0, 0.0], "a"), point("a1", vec![1.0], "a")],
                )
                .await;
            assert!(matches!(result, Err(VectorStoreError::Dimension { .. })));
            assert_eq!(store.count("c").await.unwrap(), 2);
            assert_eq!(store.collection_spec("c").await.unwrap(), Some(spec()));
        }
    }

    #[tokio::test]
    async fn upsert_into_missing_collection_fails() {
        let store = SqliteVectorStore::in_memory().await.unwrap();
        assert!(matches!(
            store.upsert("nope", vec![point("a", vec![1.0, 0.0], "x")]).await,
            Err(VectorStoreError::Upsert(_))
        ));
    }
}
