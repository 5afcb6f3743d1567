//! Background maintenance: shard compaction audits and physical deletes.
//!
//! Foreground operations stay fast by handing repair work to a single
//! worker thread over a channel. Tasks are best-effort: an audit re-checks
//! eligibility against a fresh directory read before merging anything, and
//! a failed task is logged and dropped rather than retried, since the next
//! read or delete of the same data re-enqueues an equivalent task.

use crate::config::GraphConfig;
use crate::error::Result;
use crate::graph::meta::DirectedEdgeMeta;
use crate::graph::types::{ApplicationScope, Edge};
use crate::serialization::EdgeSerialization;
use crate::shard::{compaction, NodeShardCache};
use crate::storage::StorageBackend;
use log::{debug, error, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A unit of background work.
pub(crate) enum Task {
    /// Audit one meta's shard directory and compact eligible groups.
    Audit {
        scope: ApplicationScope,
        meta: DirectedEdgeMeta,
    },
    /// Physically remove every index row of one tombstoned edge version.
    DeleteEdge {
        scope: ApplicationScope,
        edge: Edge,
    },
    /// Stop the worker after draining nothing further.
    Shutdown,
}

/// Owns the worker thread; dropping it shuts the worker down cleanly.
pub(crate) struct MaintenanceWorker {
    sender: Sender<Task>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Start the worker thread.
    pub(crate) fn spawn(
        storage: Arc<dyn StorageBackend>,
        config: Arc<GraphConfig>,
        cache: Arc<NodeShardCache>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || run(storage, config, cache, receiver));
        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Handle for enqueueing tasks from read and delete paths.
    pub(crate) fn sender(&self) -> Sender<Task> {
        self.sender.clone()
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        // Receiver may already be gone if the thread panicked
        let _ = self.sender.send(Task::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Maintenance worker thread panicked");
            }
        }
    }
}

fn run(
    storage: Arc<dyn StorageBackend>,
    config: Arc<GraphConfig>,
    cache: Arc<NodeShardCache>,
    receiver: Receiver<Task>,
) {
    debug!("Maintenance worker started");
    let serialization = EdgeSerialization::new(storage.clone());

    for task in receiver {
        let outcome: Result<()> = match task {
            Task::Audit { scope, meta } => {
                compaction::compact_eligible(&storage, &config, &scope, &meta, Some(&cache))
                    .map(|merged| {
                        if merged > 0 {
                            info!("Audit compacted {merged} shard group(s) for {meta}");
                        }
                    })
            }
            Task::DeleteEdge { scope, edge } => serialization.delete_edge_rows(&scope, &edge),
            Task::Shutdown => break,
        };
        if let Err(e) = outcome {
            // Dropped, not retried: the next touch of this data re-enqueues
            error!("Maintenance task failed: {e}");
        }
    }
    debug!("Maintenance worker stopped");
}
