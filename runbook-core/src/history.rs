use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::RunbookResult;
use crate::models::RunbookExecutionRecord;

pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Bounded, persisted log of past executions.
///
/// The whole log is one serialized JSON blob, rewritten on every append.
/// All access is serialized through a single mutex so the entry cap holds
/// under concurrent writers from independent runbooks.
pub struct HistoryStore {
    inner: Mutex<HistoryInner>,
}

struct HistoryInner {
    records: VecDeque<RunbookExecutionRecord>,
    path: Option<PathBuf>,
    max_entries: usize,
}

impl HistoryStore {
    /// Open a store backed by a blob file. A missing or unreadable blob
    /// starts an empty log rather than failing construction.
    pub async fn open(path: PathBuf, max_entries: usize) -> Self {
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<RunbookExecutionRecord>>(&bytes) {
                Ok(records) => {
                    debug!(count = records.len(), path = %path.display(), "Loaded execution history");
                    records.into()
                }
                Err(e) => {
                    warn!(path = %path.display(), "Execution history blob is corrupt, starting empty: {}", e);
                    VecDeque::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => {
                warn!(path = %path.display(), "Failed to read execution history, starting empty: {}", e);
                VecDeque::new()
            }
        };

        Self {
            inner: Mutex::new(HistoryInner {
                records,
                path: Some(path),
                max_entries: max_entries.max(1),
            }),
        }
    }

    /// In-memory store with the default cap; nothing is persisted.
    pub fn in_memory() -> Self {
        Self::in_memory_with_cap(DEFAULT_MAX_ENTRIES)
    }

    pub fn in_memory_with_cap(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                records: VecDeque::new(),
                path: None,
                max_entries: max_entries.max(1),
            }),
        }
    }

    /// Append a record, evicting the oldest entries (across all runbooks)
    /// once the cap is exceeded. The write is durable before this returns.
    pub async fn record(&self, entry: RunbookExecutionRecord) -> RunbookResult<()> {
        let mut inner = self.inner.lock().await;

        inner.records.push_back(entry);
        while inner.records.len() > inner.max_entries {
            let evicted = inner.records.pop_front();
            if let Some(evicted) = evicted {
                debug!(record_id = %evicted.id, "Evicted oldest history record");
            }
        }

        inner.persist().await
    }

    /// Records for one runbook, most recent first.
    pub async fn query(&self, runbook_id: uuid::Uuid) -> Vec<RunbookExecutionRecord> {
        let inner = self.inner.lock().await;
        inner
            .records
            .iter()
            .rev()
            .filter(|r| r.runbook_id == runbook_id)
            .cloned()
            .collect()
    }

    /// All records, most recent first.
    pub async fn all(&self) -> Vec<RunbookExecutionRecord> {
        let inner = self.inner.lock().await;
        inner.records.iter().rev().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop all records and persist the empty log.
    pub async fn clear(&self) -> RunbookResult<()> {
        let mut inner = self.inner.lock().await;
        inner.records.clear();
        inner.persist().await
    }
}

impl HistoryInner {
    async fn persist(&self) -> RunbookResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let records: Vec<&RunbookExecutionRecord> = self.records.iter().collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}
