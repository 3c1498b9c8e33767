//! Per-transport viewer registry
//!
//! Each viewer owns a bounded queue drained by its connection task.
//! Fan-out only ever calls `try_send`, so a slow or dead viewer cannot
//! block delivery to the others.

use super::types::{DeliveryReport, Transport};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Default per-viewer queue depth
pub const DEFAULT_VIEWER_QUEUE_DEPTH: usize = 32;

struct ViewerEntry<T> {
    tx: mpsc::Sender<T>,
}

/// Registry of viewers on one transport
pub struct ViewerRegistry<T> {
    transport: Transport,
    queue_depth: usize,
    viewers: RwLock<HashMap<Uuid, ViewerEntry<T>>>,
}

impl<T: Clone> ViewerRegistry<T> {
    pub fn new(transport: Transport, queue_depth: usize) -> Self {
        Self {
            transport,
            queue_depth: queue_depth.max(1),
            viewers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a viewer and return its id and queue receiver
    pub fn register(&self) -> (Uuid, mpsc::Receiver<T>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let total = {
            let mut viewers = self.viewers.write().unwrap_or_else(PoisonError::into_inner);
            viewers.insert(id, ViewerEntry { tx });
            viewers.len()
        };

        tracing::info!(
            connection_id = %id,
            transport = self.transport.as_str(),
            total,
            "Viewer connected"
        );

        (id, rx)
    }

    /// Unregister a viewer. Returns false if it was already gone.
    pub fn unregister(&self, id: &Uuid) -> bool {
        let (removed, remaining) = {
            let mut viewers = self.viewers.write().unwrap_or_else(PoisonError::into_inner);
            (viewers.remove(id).is_some(), viewers.len())
        };

        if removed {
            tracing::info!(
                connection_id = %id,
                transport = self.transport.as_str(),
                remaining,
                "Viewer disconnected"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.viewers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.viewers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Queue `payload` for a single viewer
    pub fn send_to(&self, id: &Uuid, payload: T) -> bool {
        let viewers = self.viewers.read().unwrap_or_else(PoisonError::into_inner);
        match viewers.get(id) {
            Some(entry) => entry.tx.try_send(payload).is_ok(),
            None => false,
        }
    }

    /// Queue `payload` for every viewer.
    ///
    /// Full queues skip this payload for that viewer only. Closed queues
    /// are unregistered after the pass.
    pub fn fan_out(&self, payload: T) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        {
            let viewers = self.viewers.read().unwrap_or_else(PoisonError::into_inner);
            for (id, entry) in viewers.iter() {
                match entry.tx.try_send(payload.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.lagged += 1;
                        tracing::debug!(
                            connection_id = %id,
                            transport = self.transport.as_str(),
                            "Viewer queue full, message skipped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::warn!(
                            connection_id = %id,
                            transport = self.transport.as_str(),
                            "Failed to send message, viewer closed"
                        );
                        closed.push(*id);
                    }
                }
            }
        }

        for id in closed {
            if self.unregister(&id) {
                report.removed += 1;
            }
        }

        report
    }
}
