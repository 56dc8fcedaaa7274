use crate::entry::{AuditEvent, AuditRecord, GENESIS_HASH};
use crate::error::AuditResult;
use crate::query::AuditQuery;
use crate::store::AuditStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

/// Why integrity verification stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFault {
    /// `previous_hash` does not equal the predecessor's `entry_hash`.
    BrokenLink,
    /// Recomputing the content digest gives a different `entry_hash`.
    ContentMismatch,
    /// Sequence numbers are not contiguous.
    SequenceGap,
}

/// First chain break found, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityBreak {
    pub sequence: u64,
    pub record_id: Uuid,
    pub fault: IntegrityFault,
}

/// Outcome of replaying the whole chain.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub records_checked: u64,
    pub first_break: Option<IntegrityBreak>,
}

struct ChainHead {
    sequence: u64,
    hash: String,
}

/// Writer over an append-only store, maintaining the hash chain head.
///
/// The head is recovered from storage at startup, so restarts continue the
/// existing chain instead of starting a second genesis.
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    head: Mutex<ChainHead>,
}

impl AuditTrail {
    pub async fn new(store: Arc<dyn AuditStore>) -> AuditResult<Self> {
        let head = match store.last().await? {
            Some(last) => ChainHead {
                sequence: last.sequence,
                hash: last.entry_hash,
            },
            None => ChainHead {
                sequence: 0,
                hash: GENESIS_HASH.to_string(),
            },
        };
        Ok(Self {
            store,
            head: Mutex::new(head),
        })
    }

    /// Append one event to the chain.
    ///
    /// The head lock serializes writers so two concurrent events can never
    /// claim the same predecessor.
    pub async fn record(&self, event: AuditEvent) -> AuditResult<AuditRecord> {
        let mut head = self.head.lock().await;

        let mut record = AuditRecord {
            id: Uuid::new_v4(),
            sequence: head.sequence + 1,
            timestamp: Utc::now(),
            event_category: event.event_category,
            event_type: event.event_type,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            actor_type: event.actor_type,
            actor_id: event.actor_id,
            practice_id: event.practice_id,
            patient_id: event.patient_id,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            details: event.details,
            success: event.success,
            previous_hash: head.hash.clone(),
            entry_hash: String::new(),
        };
        record.entry_hash = record.compute_hash();

        self.store.append(record.clone()).await?;
        head.sequence = record.sequence;
        head.hash = record.entry_hash.clone();

        debug!(
            sequence = record.sequence,
            event_type = %record.event_type,
            success = record.success,
            "audit record appended"
        );
        Ok(record)
    }

    /// Replay the chain and report the first break, if any.
    pub async fn verify_integrity(&self) -> AuditResult<IntegrityReport> {
        let records = self.store.all_in_order().await?;

        let mut expected_prev = GENESIS_HASH.to_string();
        let mut expected_sequence = 1u64;
        let mut checked = 0u64;

        for record in &records {
            let fault = if record.sequence != expected_sequence {
                Some(IntegrityFault::SequenceGap)
            } else if record.previous_hash != expected_prev {
                Some(IntegrityFault::BrokenLink)
            } else if record.compute_hash() != record.entry_hash {
                Some(IntegrityFault::ContentMismatch)
            } else {
                None
            };

            if let Some(fault) = fault {
                error!(
                    sequence = record.sequence,
                    record_id = %record.id,
                    ?fault,
                    "audit chain integrity break"
                );
                return Ok(IntegrityReport {
                    valid: false,
                    records_checked: checked,
                    first_break: Some(IntegrityBreak {
                        sequence: record.sequence,
                        record_id: record.id,
                        fault,
                    }),
                });
            }

            checked += 1;
            expected_sequence += 1;
            expected_prev = record.entry_hash.clone();
        }

        Ok(IntegrityReport {
            valid: true,
            records_checked: checked,
            first_break: None,
        })
    }

    /// Filtered read, newest first.
    pub async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        self.store.find(query).await
    }

    /// Accounting of disclosures: every event that touched one resource,
    /// newest first, independent of the integrity mechanism.
    pub async fn disclosures(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> AuditResult<Vec<AuditRecord>> {
        self.store
            .find(&AuditQuery::for_resource(resource_type, resource_id))
            .await
    }
}
