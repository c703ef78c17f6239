use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, CollectionSpec, ReplaceScope, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError, check_dimension, matches_filter, rank, spec_mismatch,
};

struct StoredPoint {
    seq: u64,
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    spec: CollectionSpec,
    next_seq: u64,
    points: HashMap<String, StoredPoint>,
}

impl InMemoryCollection {
    fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            next_seq: 0,
            points: HashMap::new(),
        }
    }

    /// Insert or overwrite; an overwritten point keeps its original position.
    fn put(&mut self, point: VectorPoint) {
        let seq = match self.points.get(&point.id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.points.insert(
            point.id,
            StoredPoint {
                seq,
                vector: point.vector,
                payload: point.payload,
            },
        );
    }

    /// Points in first-insertion order.
    fn ordered(&self) -> Vec<(&String, &StoredPoint)> {
        let mut points: Vec<_> = self.points.iter().collect();
        points.sort_by_key(|(_, sp)| sp.seq);
        points
    }
}

/// Process-local index, lost when dropped. Used in tests and for throwaway sessions.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let spec = spec.clone();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            if let Some(existing) = cols.get(&collection) {
                if existing.spec != spec {
                    return Err(spec_mismatch(&collection, &existing.spec, &spec));
                }
                return Ok(());
            }
            cols.insert(collection, InMemoryCollection::new(spec));
            Ok(())
        })
    }

    fn collection_spec(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<CollectionSpec>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.get(&collection).map(|c| c.spec.clone()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in &points {
                check_dimension(&col.spec, &p.vector)?;
            }
            for p in points {
                col.put(p);
            }
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
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;
            check_dimension(&col.spec, &vector)?;

            let f = filter.unwrap_or_default();
            let candidates = col
                .ordered()
                .into_iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &f))
                .map(|(id, sp)| (id.clone(), sp.vector.clone(), sp.payload.clone()));
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            let Some(col) = cols.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.points.len();
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            Ok((before - col.points.len()) as u64)
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
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;

            // Validate everything before the first mutation.
            if matches!(scope, ReplaceScope::Matching(_))
                && let Some(existing) = cols.get(&collection)
                && existing.spec != spec
            {
                return Err(spec_mismatch(&collection, &existing.spec, &spec));
            }
            for p in &points {
                check_dimension(&spec, &p.vector)?;
            }

            let removed = match &scope {
                ReplaceScope::Collection => {
                    let old = cols.insert(collection.clone(), InMemoryCollection::new(spec));
                    old.map_or(0, |c| c.points.len() as u64)
                }
                ReplaceScope::Matching(_) => {
                    let col = cols
                        .entry(collection.clone())
                        .or_insert_with(|| InMemoryCollection::new(spec));
                    let before = col.points.len();
                    col.points.retain(|_, sp| !scope.covers(&sp.payload));
                    (before - col.points.len()) as u64
                }
            };
            if let Some(col) = cols.get_mut(&collection) {
                for p in points {
                    col.put(p);
                }
            }
            Ok(removed)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.get(&collection).map_or(0, |c| c.points.len() as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(size: u64) -> CollectionSpec {
        CollectionSpec {
            vector_size: size,
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

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("test").await.unwrap());
        store.ensure_collection("test", &spec(3)).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
        assert_eq!(
            store.collection_spec("test").await.unwrap(),
            Some(spec(3))
        );
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_different_model() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        let other = CollectionSpec {
            vector_size: 3,
            embedding_model: "other-embed".into(),
        };
        assert!(matches!(
            store.ensure_collection("test", &other).await,
            Err(VectorStoreError::Collection(_))
        ));
    }

    #[tokio::test]
    async fn replace_points_swaps_only_matching_source() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a0", vec![1.0, 0.0], "a"),
                    point("a1", vec![1.0, 0.0], "a"),
                    point("b0", vec![1.0, 0.0], "b"),
                ],
            )
            .await
            .unwrap();

        let removed = store
            .replace_points(
                "test",
                &spec(2),
                ReplaceScope::Matching(vec![VectorFilter::text_eq("source", "a")]),
                vec![point("a0", vec![0.0, 1.0], "a")],
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("test").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replace_points_collection_scope_recreates() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], "a")])
            .await
            .unwrap();

        let removed = store
            .replace_points(
                "test",
                &spec(3),
                ReplaceScope::Collection,
                vec![point("b", vec![1.0, 0.0, 0.0], "b")],
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.collection_spec("test").await.unwrap(), Some(spec(3)));
        assert_eq!(store.count("test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_replace_leaves_collection_untouched() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], "a")])
            .await
            .unwrap();

        for scope in [
            ReplaceScope::Collection,
            ReplaceScope::Matching(vec![VectorFilter::text_eq("source", "a")]),
        ] {
            let result = store
                .replace_points(
                    "test",
                    &spec(2),
                    scope,
                    vec![point("a", vec![1.0, 0.0], "a"), point("x", vec![1.0], "a")],
                )
                .await;
            assert!(matches!(result, Err(VectorStoreError::Dimension { .. })));
            assert_eq!(store.count("test").await.unwrap(), 1);
        }

        let other = CollectionSpec {
            vector_size: 2,
            embedding_model: "other-embed".into(),
        };
        assert!(
            store
                .replace_points("test", &other, ReplaceScope::Matching(vec![]), vec![])
                .await
                .is_err()
        );
        assert_eq!(store.count("test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_collection_removes() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        store.delete_collection("test").await.unwrap();
        assert!(!store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "x"),
                    point("b", vec![0.0, 1.0, 0.0], "x"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("test", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        let points = (0..6)
            .map(|i| point(&format!("p{i}"), vec![1.0, 0.0], "x"))
            .collect();
        store.upsert("test", points).await.unwrap();

        let ids: Vec<String> = store
            .search("test", vec![1.0, 0.0], 6, None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["p0", "p1", "p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn reupsert_keeps_original_position() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        store
            .upsert(
                "test",
                vec![point("a", vec![1.0, 0.0], "x"), point("b", vec![1.0, 0.0], "x")],
            )
            .await
            .unwrap();
        store
            .upsert("test", vec![point("a", vec![1.0, 0.0], "x")])
            .await
            .unwrap();
        assert_eq!(store.count("test").await.unwrap(), 2);
        let results = store.search("test", vec![1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        let err = store
            .upsert("test", vec![point("a", vec![1.0], "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Dimension { .. }));
        assert_eq!(store.count("test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        assert!(matches!(
            store.search("test", vec![1.0, 0.0], 1, None).await,
            Err(VectorStoreError::Dimension { .. })
        ));
    }

    #[tokio::test]
    async fn search_with_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(3)).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], "guide.pdf"),
                    point("b", vec![0.9, 0.1, 0.0], "notes.txt"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search(
                "test",
                vec![1.0, 0.0, 0.0],
                10,
                Some(VectorFilter::text_eq("source", "notes.txt")),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn delete_by_filter_counts_removed() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("test", &spec(2)).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point("a", vec![1.0, 0.0], "one"),
                    point("b", vec![1.0, 0.0], "one"),
                    point("c", vec![1.0, 0.0], "two"),
                ],
            )
            .await
            .unwrap();

        let removed = store
            .delete_by_filter("test", VectorFilter::text_eq("source", "one"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn count_of_missing_collection_is_zero() {
        let store = InMemoryVectorStore::default();
        assert_eq!(store.count("any").await.unwrap(), 0);
        assert_eq!(
            store
                .delete_by_filter("any", VectorFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[test]
    fn debug_format() {
        let store = InMemoryVectorStore::new();
        assert!(format!("{store:?}").contains("InMemoryVectorStore"));
    }
}
