//! In-process exact index.

use super::{check_dimension, dot, rank, IndexedItem, SearchFilters, SearchHit, VectorIndex};
use ark_core::AppResult;
use tokio::sync::RwLock;

/// Linear-scan index held in memory.
///
/// Every eligible item is scored, so results are exact. Writers take the
/// lock for the duration of one push; readers never see a partial item.
#[derive(Debug)]
pub struct ExactIndex {
    dimension: usize,
    items: RwLock<Vec<IndexedItem>>,
}

impl ExactIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait::async_trait]
impl VectorIndex for ExactIndex {
    fn backend_name(&self) -> &str {
        "exact"
    }

    async fn insert(&self, item: IndexedItem) -> AppResult<()> {
        check_dimension(self.dimension, item.vector.len(), "Vector")?;
        self.items.write().await.push(item);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        check_dimension(self.dimension, query.len(), "Query vector")?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let items = self.items.read().await;
        let hits: Vec<SearchHit> = items
            .iter()
            .filter(|item| filters.matches(item))
            .map(|item| SearchHit {
                score: dot(query, &item.vector),
                item: item.clone(),
            })
            .collect();
        drop(items);

        let ranked = rank(hits, top_k);
        tracing::debug!(
            "Exact search returned {} hits (requested top-{})",
            ranked.len(),
            top_k
        );
        Ok(ranked)
    }

    async fn items_by_owner(&self, owner_id: &str) -> AppResult<Vec<IndexedItem>> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|item| item.owner_id != owner_id);
        Ok(before - items.len())
    }

    async fn count_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.owner_id == owner_id)
            .count())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.items.read().await.len())
    }
}
