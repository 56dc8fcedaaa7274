use crate::entry::AuditRecord;
use crate::error::{AuditError, AuditResult};
use crate::query::AuditQuery;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Append-only record storage. Implementations must reject any mutation of
/// existing rows; the only write is an append.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> AuditResult<()>;

    /// The newest record, if any (chain head recovery at startup).
    async fn last(&self) -> AuditResult<Option<AuditRecord>>;

    /// All records in chain order (ascending sequence).
    async fn all_in_order(&self) -> AuditResult<Vec<AuditRecord>>;

    /// Records matching the query, newest first.
    async fn find(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>>;
}

/// In-memory append-only store.
#[derive(Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> AuditResult<()> {
        let mut records = self.records.write();
        if let Some(last) = records.last() {
            if record.sequence != last.sequence + 1 {
                return Err(AuditError::Storage(format!(
                    "non-contiguous append: got sequence {}, expected {}",
                    record.sequence,
                    last.sequence + 1
                )));
            }
        }
        records.push(record);
        Ok(())
    }

    async fn last(&self) -> AuditResult<Option<AuditRecord>> {
        Ok(self.records.read().last().cloned())
    }

    async fn all_in_order(&self) -> AuditResult<Vec<AuditRecord>> {
        Ok(self.records.read().clone())
    }

    async fn find(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        let records = self.records.read();
        let mut hits: Vec<AuditRecord> = records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        hits.reverse();
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}
