//! In-process vector index.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    cosine_distance, Error, Result, SessionFilter, VectorEntry, VectorIndex, VectorMatch,
};

/// Brute-force cosine index, one partition per session.
#[derive(Default)]
pub struct MemoryVectorIndex {
    dimension: Option<usize>,
    partitions: RwLock<HashMap<String, Vec<VectorEntry>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject vectors whose length differs from `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            partitions: RwLock::new(HashMap::new()),
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(Error::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

fn to_match(entry: &VectorEntry, distance: f32) -> VectorMatch {
    VectorMatch {
        id: entry.id.clone(),
        text: entry.text.clone(),
        distance,
        metadata: entry.metadata.clone(),
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        self.check_dimension(entry.vector.len())?;

        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry(entry.metadata.session_id.clone())
            .or_default();

        match partition.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => partition.push(entry),
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SessionFilter,
    ) -> Result<Vec<VectorMatch>> {
        self.check_dimension(vector.len())?;

        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(filter.session_id()) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = partition
            .iter()
            .map(|e| to_match(e, cosine_distance(vector, &e.vector)))
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);

        debug!(
            session_id = %filter.session_id(),
            candidates = partition.len(),
            returned = matches.len(),
            "Queried in-memory index"
        );

        Ok(matches)
    }

    async fn get(&self, filter: &SessionFilter, id: &str) -> Result<Option<VectorMatch>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(filter.session_id())
            .and_then(|p| p.iter().find(|e| e.id == id))
            .map(|e| to_match(e, 0.0)))
    }

    async fn delete(&self, filter: &SessionFilter, id: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        let Some(partition) = partitions.get_mut(filter.session_id()) else {
            return Ok(false);
        };

        let before = partition.len();
        partition.retain(|e| e.id != id);
        Ok(partition.len() < before)
    }

    async fn delete_session(&self, filter: &SessionFilter) -> Result<usize> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .remove(filter.session_id())
            .map(|p| p.len())
            .unwrap_or(0))
    }

    async fn count(&self, filter: &SessionFilter) -> Result<usize> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(filter.session_id())
            .map(Vec::len)
            .unwrap_or(0))
    }
}
