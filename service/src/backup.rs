//! Bounded worker pool for best-effort cart mirror writes.
//!
//! Cart mutations hand a [`BackupJob`] to a [`BackupQueue`] and return
//! immediately. Jobs are sharded by user across `backup_workers` tasks, so the
//! writes for one cart reach the mirror in the order they were submitted.
//! Each write runs under its own timeout, detached from the request that
//! produced it. Nothing is reported back: failures are logged and counted.

use crate::config::CartConfig;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use storefront_core::cart::CartEntry;
use storefront_core::ids::{ProductId, UserId};
use storefront_core::providers::CartMirror;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Span;

/// One mirror write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupJob {
    /// Insert or replace the mirrored line.
    Upsert(CartEntry),
    /// Remove the mirrored line.
    Delete {
        /// Cart owner
        user_id: UserId,
        /// Removed product
        product_id: ProductId,
    },
}

impl BackupJob {
    const fn user_id(&self) -> UserId {
        match self {
            Self::Upsert(entry) => entry.user_id,
            Self::Delete { user_id, .. } => *user_id,
        }
    }
}

/// Sending side of the pool; cheap to clone.
#[derive(Debug, Clone)]
pub struct BackupQueue {
    shards: Vec<mpsc::Sender<BackupJob>>,
    span: Span,
}

impl BackupQueue {
    /// Hand a job to the pool without waiting.
    ///
    /// A full or closed queue drops the job with a warning.
    pub fn submit(&self, job: BackupJob) {
        let user_id = job.user_id();
        let Some(shard) = self.shards.get(shard_of(user_id, self.shards.len())) else {
            return;
        };
        if let Err(e) = shard.try_send(job) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "pool shut down",
            };
            metrics::counter!("storefront_cart_backup_dropped_total").increment(1);
            tracing::warn!(
                parent: &self.span,
                user_id = %user_id,
                reason,
                "Dropping cart backup job"
            );
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn shard_of(user_id: UserId, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Running pool; call [`shutdown`](Self::shutdown) to drain it.
#[derive(Debug)]
pub struct BackupWorkers {
    workers: Vec<JoinHandle<()>>,
    stop: watch::Sender<bool>,
}

impl BackupWorkers {
    /// Spawn the workers and return the pool with its queue.
    ///
    /// The queue capacity is split evenly across workers. Must be called
    /// inside a Tokio runtime.
    #[must_use]
    pub fn start<M>(mirror: M, config: &CartConfig, span: Span) -> (Self, BackupQueue)
    where
        M: CartMirror + Clone + 'static,
    {
        let count = config.backup_workers.max(1);
        let capacity = (config.backup_queue_capacity / count).max(1);
        let (stop, stopped) = watch::channel(false);

        let mut shards = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        for worker in 0..count {
            let (tx, rx) = mpsc::channel(capacity);
            shards.push(tx);
            workers.push(tokio::spawn(run_worker(
                worker,
                mirror.clone(),
                rx,
                stopped.clone(),
                config.backup_timeout,
                span.clone(),
            )));
        }

        (Self { workers, stop }, BackupQueue { shards, span })
    }

    /// Stop accepting jobs, finish everything already queued, and wait for
    /// the workers to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Cart backup worker panicked");
            }
        }
    }
}

async fn run_worker<M: CartMirror>(
    worker: usize,
    mirror: M,
    mut rx: mpsc::Receiver<BackupJob>,
    mut stopped: watch::Receiver<bool>,
    timeout: Duration,
    span: Span,
) {
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => run_job(&mirror, job, timeout, &span).await,
                None => return,
            },
            _ = stopped.changed() => break,
        }
    }

    // Stop accepting, then drain what is already buffered.
    rx.close();
    while let Some(job) = rx.recv().await {
        run_job(&mirror, job, timeout, &span).await;
    }
    tracing::debug!(parent: &span, worker, "Cart backup worker drained");
}

async fn run_job<M: CartMirror>(mirror: &M, job: BackupJob, timeout: Duration, span: &Span) {
    let user_id = job.user_id();
    let write = async {
        match &job {
            BackupJob::Upsert(entry) => mirror.upsert(entry).await,
            BackupJob::Delete {
                user_id,
                product_id,
            } => mirror.delete(*user_id, *product_id).await,
        }
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => {
            metrics::counter!("storefront_cart_backup_failures_total").increment(1);
            tracing::warn!(
                parent: span,
                user_id = %user_id,
                error = %e,
                "Cart backup write failed"
            );
        },
        Err(_) => {
            metrics::counter!("storefront_cart_backup_failures_total").increment(1);
            tracing::warn!(
                parent: span,
                user_id = %user_id,
                ?timeout,
                "Cart backup write timed out"
            );
        },
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storefront_testing::InMemoryCatalog;

    fn entry(user_id: UserId, product_id: ProductId) -> CartEntry {
        let now = Utc::now();
        CartEntry {
            user_id,
            product_id,
            quantity: 2,
            description: String::new(),
            checked: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs_in_order() {
        let mirror = InMemoryCatalog::new();
        let (workers, queue) =
            BackupWorkers::start(mirror.clone(), &CartConfig::default(), Span::none());
        let user = UserId::new();
        let products: Vec<ProductId> = (0..10).map(|_| ProductId::new()).collect();

        for product in &products {
            queue.submit(BackupJob::Upsert(entry(user, *product)));
        }
        queue.submit(BackupJob::Delete {
            user_id: user,
            product_id: products[0],
        });
        workers.shutdown().await;

        assert_eq!(mirror.mirror_writes(), 11);
        assert!(mirror.mirrored(user, products[0]).is_none());
        assert!(products[1..].iter().all(|p| mirror.mirrored(user, *p).is_some()));
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_pool() {
        let mirror = InMemoryCatalog::new();
        let (workers, queue) =
            BackupWorkers::start(mirror.clone(), &CartConfig::default(), Span::none());
        let user = UserId::new();

        mirror.set_mirror_unavailable(true);
        queue.submit(BackupJob::Upsert(entry(user, ProductId::new())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        mirror.set_mirror_unavailable(false);
        let kept = ProductId::new();
        queue.submit(BackupJob::Upsert(entry(user, kept)));
        workers.shutdown().await;

        assert!(mirror.mirrored(user, kept).is_some());
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_dropped() {
        let mirror = InMemoryCatalog::new();
        let (workers, queue) =
            BackupWorkers::start(mirror.clone(), &CartConfig::default(), Span::none());
        workers.shutdown().await;

        queue.submit(BackupJob::Upsert(entry(UserId::new(), ProductId::new())));
        assert_eq!(mirror.mirror_writes(), 0);
    }
}
