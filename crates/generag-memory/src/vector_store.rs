use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("vector has {actual} dimensions, collection expects {expected}")]
    Dimension { expected: u64, actual: u64 },
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Shape of a collection, fixed when it is first created.
///
/// The embedding model is recorded so a collection built with one model is never
/// queried with vectors from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub vector_size: u64,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    /// Filter matching points whose `field` equals the given text.
    #[must_use]
    pub fn text_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            must: vec![FieldCondition {
                field: field.into(),
                value: FieldValue::Text(value.into()),
            }],
            must_not: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

/// Existing points superseded by [`VectorStore::replace_points`].
#[derive(Debug, Clone)]
pub enum ReplaceScope {
    /// All points; the collection is recreated with the new spec.
    Collection,
    /// Points matching any of the filters; the collection spec must not change.
    Matching(Vec<VectorFilter>),
}

impl ReplaceScope {
    pub(crate) fn covers(&self, payload: &HashMap<String, serde_json::Value>) -> bool {
        match self {
            Self::Collection => true,
            Self::Matching(filters) => filters.iter().any(|f| matches_filter(payload, f)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Narrow similarity-index interface used by ingestion and retrieval.
///
/// `search` returns points by descending cosine similarity; equal scores keep
/// the order in which points were first inserted.
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Fails if it exists with a different spec.
    fn ensure_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_spec(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<CollectionSpec>, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    /// Remove every point matching `filter`; returns the number removed.
    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    /// Remove the points in `scope` and write `points` as one atomic step.
    ///
    /// Creates the collection when absent. On error the collection is left
    /// exactly as it was. Returns the number of points removed.
    fn replace_points(
        &self,
        collection: &str,
        spec: &CollectionSpec,
        scope: ReplaceScope,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    /// Number of points in the collection, zero when it does not exist.
    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let spec = self.collection_spec(collection);
        Box::pin(async move { Ok(spec.await?.is_some()) })
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn matches_filter(
    payload: &HashMap<String, serde_json::Value>,
    filter: &VectorFilter,
) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if !field_matches(val, &cond.value) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if let Some(val) = payload.get(&cond.field)
            && field_matches(val, &cond.value)
        {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}

pub(crate) fn spec_mismatch(
    collection: &str,
    existing: &CollectionSpec,
    requested: &CollectionSpec,
) -> VectorStoreError {
    VectorStoreError::Collection(format!(
        "collection {collection} was created with {} ({} dims), not {} ({} dims)",
        existing.embedding_model,
        existing.vector_size,
        requested.embedding_model,
        requested.vector_size
    ))
}

pub(crate) fn check_dimension(spec: &CollectionSpec, vector: &[f32]) -> Result<(), VectorStoreError> {
    let actual = vector.len() as u64;
    if actual == spec.vector_size {
        Ok(())
    } else {
        Err(VectorStoreError::Dimension {
            expected: spec.vector_size,
            actual,
        })
    }
}

/// Score candidates against `query`, keep the best `limit`, ties in candidate order.
pub(crate) fn rank<I>(query: &[f32], candidates: I, limit: u64) -> Vec<ScoredVectorPoint>
where
    I: IntoIterator<Item = (String, Vec<f32>, HashMap<String, serde_json::Value>)>,
{
    let mut scored: Vec<ScoredVectorPoint> = candidates
        .into_iter()
        .map(|(id, vector, payload)| ScoredVectorPoint {
            id,
            score: cosine_similarity(query, &vector),
            payload,
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: &str) -> HashMap<String, serde_json::Value> {
        HashMap::from([("source".into(), serde_json::json!(source))])
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn text_eq_filter_matches() {
        let f = VectorFilter::text_eq("source", "a.pdf");
        assert!(matches_filter(&payload("a.pdf"), &f));
        assert!(!matches_filter(&payload("b.pdf"), &f));
        assert!(!matches_filter(&HashMap::new(), &f));
    }

    #[test]
    fn must_not_excludes() {
        let f = VectorFilter {
            must: vec![],
            must_not: vec![FieldCondition {
                field: "chunk_index".into(),
                value: FieldValue::Integer(0),
            }],
        };
        let p = HashMap::from([("chunk_index".into(), serde_json::json!(0))]);
        assert!(!matches_filter(&p, &f));
        let p = HashMap::from([("chunk_index".into(), serde_json::json!(1))]);
        assert!(matches_filter(&p, &f));
    }

    #[test]
    fn replace_scope_matches_any_filter() {
        let scope = ReplaceScope::Matching(vec![
            VectorFilter::text_eq("source", "a.pdf"),
            VectorFilter::text_eq("source", "b.pdf"),
        ]);
        assert!(scope.covers(&payload("a.pdf")));
        assert!(scope.covers(&payload("b.pdf")));
        assert!(!scope.covers(&payload("c.pdf")));
        assert!(!ReplaceScope::Matching(vec![]).covers(&payload("a.pdf")));
        assert!(ReplaceScope::Collection.covers(&HashMap::new()));
    }

    #[test]
    fn rank_orders_descending_and_keeps_ties_stable() {
        let candidates = vec![
            ("low".to_owned(), vec![0.0, 1.0], HashMap::new()),
            ("tie-a".to_owned(), vec![1.0, 0.0], HashMap::new()),
            ("tie-b".to_owned(), vec![2.0, 0.0], HashMap::new()),
        ];
        let ranked = rank(&[1.0, 0.0], candidates, 10);
        let ids: Vec<&str> = ranked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["tie-a", "tie-b", "low"]);
    }

    #[test]
    fn rank_truncates_to_limit() {
        let candidates = (0..5).map(|i| (i.to_string(), vec![1.0, 0.0], HashMap::new()));
        assert_eq!(rank(&[1.0, 0.0], candidates, 3).len(), 3);
    }

    #[test]
    fn dimension_check() {
        let spec = CollectionSpec {
            vector_size: 3,
            embedding_model: "m".into(),
        };
        assert!(check_dimension(&spec, &[1.0, 2.0, 3.0]).is_ok());
        assert!(matches!(
            check_dimension(&spec, &[1.0]),
            Err(VectorStoreError::Dimension {
                expected: 3,
                actual: 1
            })
        ));
    }
}
