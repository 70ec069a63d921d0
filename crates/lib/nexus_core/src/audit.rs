//! Audit recorder.
//!
//! Appends security events to the store. Recording is best-effort: a failed
//! append is logged and swallowed so it never aborts the operation being
//! described.

use std::sync::Arc;

use tracing::warn;

use crate::models::audit::{AuditPage, AuditQuery, NewAuditEntry};
use crate::store::{Store, StoreResult};

/// Writer and reader of the audit trail.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Store>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append `entry`, logging on failure.
    pub async fn record(&self, entry: NewAuditEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(action = %entry.action, "failed to record audit entry: {e}");
        }
    }

    /// One page of entries, newest first.
    pub async fn list(&self, query: &AuditQuery) -> StoreResult<AuditPage> {
        let (logs, total) = self.store.list_audit(query).await?;
        Ok(AuditPage {
            logs,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}
