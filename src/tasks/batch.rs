//! Sweep Batches
//!
//! Groups one page of expired rows into partition-scoped delete batches.

use std::collections::HashMap;

use crate::store::{BatchOperation, RowRef, MAX_BATCH_OPERATIONS};

// == Sweep Batch ==
/// Delete targets sharing one partition key, at most `MAX_BATCH_OPERATIONS` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepBatch {
    segment: String,
    ids: Vec<String>,
}

impl SweepBatch {
    fn new(segment: String) -> Self {
        Self {
            segment,
            ids: Vec::new(),
        }
    }

    /// Splits rows into one batch per segment, in first-seen segment order.
    ///
    /// A segment with more than `MAX_BATCH_OPERATIONS` rows gets several batches.
    pub fn partition(rows: Vec<RowRef>) -> Vec<SweepBatch> {
        let mut batches: Vec<SweepBatch> = Vec::new();
        // segment -> index of its open batch
        let mut open: HashMap<String, usize> = HashMap::new();

        for RowRef { segment, id } in rows {
            let index = match open.get(&segment) {
                Some(&index) if batches[index].ids.len() < MAX_BATCH_OPERATIONS => index,
                _ => {
                    batches.push(SweepBatch::new(segment.clone()));
                    open.insert(segment, batches.len() - 1);
                    batches.len() - 1
                }
            };
            batches[index].ids.push(id);
        }

        batches
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Consumes the batch into store delete operations.
    pub fn into_operations(self) -> Vec<BatchOperation> {
        let segment = self.segment;
        self.ids
            .into_iter()
            .map(|id| BatchOperation::Delete(RowRef::new(segment.clone(), id)))
            .collect()
    }
}
