use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::cache_validator::ValidatedCacheEntry;
use crate::circuit_breaker::{create_gateway_circuit_breaker, GatewayCircuitBreaker};
use crate::connectivity::ConnectivityMonitor;
use crate::errors::{AppError, ResultExt};
use crate::gateway_client::CrmGatewayClient;
use crate::models::{
    ContactSnapshot, InteractionOutcome, InteractionRecord, QueuedAction, QuickAction,
};
use crate::storage::{BlobStore, OFFLINE_QUEUE_KEY};

/// Replays a queued action against the outside world once connectivity is
/// back. Production uses [`GatewayReplayer`]; tests substitute scripted
/// implementations.
pub trait ActionReplayer: Send + Sync {
    fn replay(&self, item: &QueuedAction) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Replayer that records the queued interaction in the CRM, guarded by a
/// circuit breaker so a flapping gateway cannot burn through retry budgets.
pub struct GatewayReplayer {
    gateway: CrmGatewayClient,
    breaker: GatewayCircuitBreaker,
}

impl GatewayReplayer {
    pub fn new(gateway: CrmGatewayClient) -> Self {
        Self {
            gateway,
            breaker: create_gateway_circuit_breaker(),
        }
    }
}

impl ActionReplayer for GatewayReplayer {
    fn replay(&self, item: &QueuedAction) -> impl Future<Output = Result<(), AppError>> + Send {
        async move {
            let record = InteractionRecord {
                contact_id: item.contact.id,
                action_type: item.action.action_type,
                outcome: InteractionOutcome::Successful,
                timestamp: Utc::now(),
            };

            use failsafe::futures::CircuitBreaker;
            self.breaker
                .call(self.gateway.record_interaction(&record))
                .await
                .map_err(|e| match e {
                    failsafe::Error::Inner(inner) => inner,
                    failsafe::Error::Rejected => AppError::ExternalApiError(
                        "Circuit breaker open, gateway calls suspended".to_string(),
                    ),
                })
        }
    }
}

/// Summary of one queue drain.
#[derive(Debug, Default, serde::Serialize)]
pub struct ProcessReport {
    /// Items successfully replayed and removed.
    pub replayed: usize,
    /// Items discarded after exhausting their retry budget.
    pub dropped: usize,
    /// Items still queued when the drain ended.
    pub remaining: usize,
}

/// Persistent queue of actions that could not be executed while offline.
///
/// The queue lives as a checksummed JSON array in the blob store under
/// [`OFFLINE_QUEUE_KEY`]. Drains are serialized by an atomic flag; this is a
/// single-process guard, not a cross-process lock.
pub struct OfflineQueueService<R: ActionReplayer> {
    store: Arc<dyn BlobStore>,
    replayer: R,
    connectivity: Arc<ConnectivityMonitor>,
    is_processing: AtomicBool,
    max_retries: u32,
    retry_delay: Duration,
}

impl<R: ActionReplayer> OfflineQueueService<R> {
    pub fn new(
        store: Arc<dyn BlobStore>,
        replayer: R,
        connectivity: Arc<ConnectivityMonitor>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            replayer,
            connectivity,
            is_processing: AtomicBool::new(false),
            max_retries,
            retry_delay,
        }
    }

    /// Appends an action to the queue with a fresh retry budget.
    pub fn enqueue(
        &self,
        action: QuickAction,
        contact: ContactSnapshot,
    ) -> Result<QueuedAction, AppError> {
        let item = QueuedAction {
            id: Uuid::new_v4(),
            action,
            contact,
            queued_at: Utc::now(),
            retry_count: 0,
            max_retries: self.max_retries,
        };

        let mut queue = self.load_queue()?;
        queue.push(item.clone());
        self.save_queue(&queue)?;

        tracing::info!(
            "Queued action '{}' for contact {} ({} item(s) pending)",
            item.action.label,
            item.contact.id,
            queue.len()
        );
        Ok(item)
    }

    /// Current queue contents, oldest first.
    pub fn queue(&self) -> Result<Vec<QueuedAction>, AppError> {
        self.load_queue()
    }

    /// Drains the queue: replays every item, removing successes and dropping
    /// items whose retry budget is exhausted. Failed items stay queued and
    /// another pass runs after the retry delay, so the drain terminates once
    /// every remaining item has either succeeded or been dropped.
    ///
    /// Re-entrant calls and offline drains return immediately.
    pub async fn process(&self) -> Result<ProcessReport, AppError> {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Queue drain already in flight, skipping");
            return Ok(ProcessReport {
                remaining: self.load_queue()?.len(),
                ..Default::default()
            });
        }

        let result = self.drain().await;
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn drain(&self) -> Result<ProcessReport, AppError> {
        let mut report = ProcessReport::default();

        loop {
            if !self.connectivity.is_online() {
                tracing::debug!("Offline, leaving queued actions for later");
                break;
            }

            let queue = self.load_queue()?;
            if queue.is_empty() {
                break;
            }
            tracing::info!("Processing {} queued action(s)", queue.len());

            let mut remaining = Vec::new();
            for mut item in queue {
                match self.replayer.replay(&item).await {
                    Ok(()) => {
                        report.replayed += 1;
                        tracing::info!("Replayed queued action '{}' ({})", item.action.label, item.id);
                    }
                    Err(e) => {
                        item.retry_count += 1;
                        if item.retry_count >= item.max_retries {
                            report.dropped += 1;
                            tracing::warn!(
                                "Dropping queued action '{}' ({}) after {} attempt(s): {}",
                                item.action.label,
                                item.id,
                                item.retry_count,
                                e
                            );
                        } else {
                            tracing::debug!(
                                "Replay of {} failed (attempt {}/{}): {}",
                                item.id,
                                item.retry_count,
                                item.max_retries,
                                e
                            );
                            remaining.push(item);
                        }
                    }
                }
            }

            let done = remaining.is_empty();
            self.save_queue(&remaining)?;
            if done {
                break;
            }
            tokio::time::sleep(self.retry_delay).await;
        }

        report.remaining = self.load_queue()?.len();
        Ok(report)
    }

    fn load_queue(&self) -> Result<Vec<QueuedAction>, AppError> {
        let Some(blob) = self
            .store
            .get(OFFLINE_QUEUE_KEY)
            .context("reading offline queue")?
        else {
            return Ok(Vec::new());
        };

        match ValidatedCacheEntry::deserialize_and_validate(&blob) {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                tracing::warn!("Offline queue blob failed validation, starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn save_queue(&self, queue: &[QueuedAction]) -> Result<(), AppError> {
        let json = serde_json::to_string(queue)?;
        let entry = ValidatedCacheEntry::new(json);
        self.store
            .put(OFFLINE_QUEUE_KEY, &entry.serialize())
            .context("writing offline queue")
    }
}
