//! # Side-Effect Processor
//!
//! Drains the `side_effects` queue that coordinators fill inside their
//! transactions.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Side-Effect Processor Flow                           │
//! │                                                                         │
//! │  SaleCoordinator ── commit ──► handle.notify() ──┐                     │
//! │                                                   │ wake               │
//! │  interval.tick() (poll_interval_secs) ────────────┤                     │
//! │                                                   ▼                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  drain_once                                                     │   │
//! │  │                                                                 │   │
//! │  │  1. due(now, batch_size)                                       │   │
//! │  │  2. decode payload ── malformed ──► dead letter                │   │
//! │  │  3. ledger_post   → LedgerPoster.post                          │   │
//! │  │     loyalty_award → LoyaltyAwarder.award                       │   │
//! │  │  4. ok    → mark_completed                                     │   │
//! │  │     error → attempts+1 < max_attempts ? retry after backoff    │   │
//! │  │                                       : dead letter            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Delivery is at-least-once; both collaborators are idempotent, so a    │
//! │  crash between apply and mark_completed does not double-post.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use keystone_core::effects::{retry_delay, SideEffect, SideEffectPayload};
use keystone_db::Database;

use crate::collaborators::{LedgerPoster, LoyaltyAwarder};
use crate::config::SideEffectSettings;
use crate::error::{TxnError, TxnResult};

/// Outcome counts of one [`SideEffectProcessor::drain_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.completed + self.retried + self.dead_lettered == 0
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cheap, cloneable handle for waking and stopping the processor.
#[derive(Debug, Clone)]
pub struct SideEffectHandle {
    wake_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SideEffectHandle {
    /// Asks the processor to drain now. Never blocks; a wake-up already
    /// pending is enough.
    pub fn notify(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                warn!("Side-effect processor is not running; entries stay queued");
            }
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> TxnResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| TxnError::Internal("Shutdown channel closed".into()))
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Applies queued ledger postings and loyalty awards.
pub struct SideEffectProcessor {
    db: Database,
    ledger: Arc<dyn LedgerPoster>,
    loyalty: Arc<dyn LoyaltyAwarder>,
    settings: SideEffectSettings,
    wake_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SideEffectProcessor {
    /// Creates a processor and the handle that controls it.
    pub fn new(
        db: Database,
        ledger: Arc<dyn LedgerPoster>,
        loyalty: Arc<dyn LoyaltyAwarder>,
        settings: SideEffectSettings,
    ) -> (Self, SideEffectHandle) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = SideEffectProcessor {
            db,
            ledger,
            loyalty,
            settings,
            wake_rx,
            shutdown_rx,
        };

        (processor, SideEffectHandle { wake_tx, shutdown_tx })
    }

    /// Runs until [`SideEffectHandle::shutdown`] is called.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            batch_size = self.settings.batch_size,
            max_attempts = self.settings.max_attempts,
            "Side-effect processor starting"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.drain_logged().await,

                Some(()) = self.wake_rx.recv() => self.drain_logged().await,

                _ = self.shutdown_rx.recv() => {
                    info!("Side-effect processor shutting down");
                    break;
                }
            }
        }

        info!("Side-effect processor stopped");
    }

    async fn drain_logged(&self) {
        match self.drain_once().await {
            Ok(report) if !report.is_empty() => {
                info!(
                    completed = report.completed,
                    retried = report.retried,
                    dead_lettered = report.dead_lettered,
                    "Side-effect batch processed"
                );
            }
            Ok(_) => debug!("No due side effects"),
            Err(e) => error!(error = %e, "Failed to process side-effect batch"),
        }
    }

    /// Processes one batch of due entries.
    pub async fn drain_once(&self) -> TxnResult<DrainReport> {
        let queue = self.db.side_effects();
        let due = queue.due(Utc::now(), self.settings.batch_size).await?;
        let mut report = DrainReport::default();

        for effect in due {
            let payload = match effect.decode() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(effect_id = %effect.id, error = %e, "Malformed side-effect payload");
                    queue
                        .mark_dead_lettered(&effect.id, &format!("malformed payload: {e}"), Utc::now())
                        .await?;
                    report.dead_lettered += 1;
                    continue;
                }
            };

            match self.apply(&payload).await {
                Ok(applied) => {
                    queue.mark_completed(&effect.id, Utc::now()).await?;
                    debug!(effect_id = %effect.id, kind = %effect.kind, applied, "Side effect completed");
                    report.completed += 1;
                }
                Err(e) => {
                    if self.record_failure(&effect, &e).await? {
                        report.dead_lettered += 1;
                    } else {
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn apply(&self, payload: &SideEffectPayload) -> TxnResult<bool> {
        match payload {
            SideEffectPayload::LedgerPost {
                company_id,
                reference,
                amount,
                user_id,
            } => self.ledger.post(*company_id, reference, *amount, *user_id).await,
            SideEffectPayload::LoyaltyAward {
                company_id,
                customer_id,
                sale_id,
                amount,
                ..
            } => self.loyalty.award(*company_id, *customer_id, *sale_id, *amount).await,
        }
    }

    /// Schedules a retry or dead-letters the entry. Returns true when the
    /// entry was dead-lettered.
    async fn record_failure(&self, effect: &SideEffect, err: &TxnError) -> TxnResult<bool> {
        let queue = self.db.side_effects();
        let now = Utc::now();
        let attempts = u32::try_from(effect.attempts + 1).unwrap_or(u32::MAX);
        let message = err.to_string();

        if attempts >= self.settings.max_attempts {
            error!(
                effect_id = %effect.id,
                kind = %effect.kind,
                reference = %effect.reference,
                attempts,
                error = %message,
                "Side effect exhausted its attempts"
            );
            queue.mark_dead_lettered(&effect.id, &message, now).await?;
            return Ok(true);
        }

        let delay = retry_delay(attempts, self.settings.initial_backoff(), self.settings.max_backoff());
        let next_attempt_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        warn!(
            effect_id = %effect.id,
            kind = %effect.kind,
            attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %message,
            "Side effect failed, will retry"
        );
        queue.mark_failed(&effect.id, &message, next_attempt_at, now).await?;
        Ok(false)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{SqlLedgerPoster, SqlLoyaltyAwarder};
    use crate::testing::Fixture;
    use async_trait::async_trait;
    use keystone_core::Money;
    use keystone_db::repository::side_effects;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls, then delegates to nothing.
    struct FlakyLedger {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerPoster for FlakyLedger {
        async fn post(&self, _: i64, _: &str, _: Money, _: i64) -> TxnResult<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TxnError::Transient("ledger unavailable".into()))
            } else {
                Ok(true)
            }
        }
    }

    fn settings(max_attempts: u32) -> SideEffectSettings {
        SideEffectSettings {
            poll_interval_secs: 3600,
            batch_size: 10,
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_secs: 0,
        }
    }

    async fn enqueue_post(fx: &Fixture, reference: &str, cents: i64) -> String {
        let mut tx = fx.db.begin().await.unwrap();
        let row = side_effects::enqueue(
            &mut tx,
            &SideEffectPayload::LedgerPost {
                company_id: fx.company,
                reference: reference.to_string(),
                amount: Money::from_cents(cents),
                user_id: 1,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        row.id
    }

    fn processor(fx: &Fixture, ledger: Arc<dyn LedgerPoster>, max_attempts: u32) -> (SideEffectProcessor, SideEffectHandle) {
        SideEffectProcessor::new(
            fx.db.clone(),
            ledger,
            Arc::new(SqlLoyaltyAwarder::new(fx.db.clone(), 1)),
            settings(max_attempts),
        )
    }

    #[tokio::test]
    async fn test_drain_posts_ledger_entry() {
        let fx = Fixture::new().await;
        let id = enqueue_post(&fx, "INV-000001", 2300).await;
        let (worker, _handle) = processor(&fx, Arc::new(SqlLedgerPoster::new(fx.db.clone())), 10);

        let report = worker.drain_once().await.unwrap();
        assert_eq!(report.completed, 1);

        let row = fx.db.side_effects().get(&id).await.unwrap().unwrap();
        assert!(!row.is_pending());
        assert_eq!(row.attempts, 1);
        let entry = fx.db.ledger().find_by_reference(fx.company, "INV-000001").await.unwrap().unwrap();
        assert_eq!(entry.credit_cents, 2300);

        assert!(worker.drain_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_retried_then_succeeds() {
        let fx = Fixture::new().await;
        let id = enqueue_post(&fx, "INV-000002", 500).await;
        let ledger = Arc::new(FlakyLedger {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let (worker, _handle) = processor(&fx, ledger.clone(), 10);

        assert_eq!(worker.drain_once().await.unwrap().retried, 1);
        let row = fx.db.side_effects().get(&id).await.unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error.as_deref(), Some("Transient failure: ledger unavailable"));

        assert_eq!(worker.drain_once().await.unwrap().retried, 1);
        assert_eq!(worker.drain_once().await.unwrap().completed, 1);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fx.db.side_effects().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_entry_is_dead_lettered() {
        let fx = Fixture::new().await;
        let id = enqueue_post(&fx, "INV-000003", 500).await;
        let ledger = Arc::new(FlakyLedger {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let (worker, _handle) = processor(&fx, ledger, 3);

        assert_eq!(worker.drain_once().await.unwrap().retried, 1);
        assert_eq!(worker.drain_once().await.unwrap().retried, 1);
        assert_eq!(worker.drain_once().await.unwrap().dead_lettered, 1);
        assert!(worker.drain_once().await.unwrap().is_empty());

        let row = fx.db.side_effects().get(&id).await.unwrap().unwrap();
        assert_eq!(row.attempts, 3);
        assert!(row.dead_lettered_at.is_some());
        assert_eq!(fx.db.side_effects().dead_letters(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered() {
        let fx = Fixture::new().await;
        let id = enqueue_post(&fx, "INV-000004", 500).await;
        sqlx::query("UPDATE side_effects SET payload = '{\"kind\":\"unknown\"}' WHERE id = ?1")
            .bind(&id)
            .execute(fx.db.pool())
            .await
            .unwrap();

        let (worker, _handle) = processor(&fx, Arc::new(SqlLedgerPoster::new(fx.db.clone())), 10);
        assert_eq!(worker.drain_once().await.unwrap().dead_lettered, 1);
        assert!(fx.db.ledger().find_by_reference(fx.company, "INV-000004").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_drains_on_notify_and_stops_on_shutdown() {
        let fx = Fixture::new().await;
        let (worker, handle) = processor(&fx, Arc::new(SqlLedgerPoster::new(fx.db.clone())), 10);
        let task = tokio::spawn(worker.run());

        enqueue_post(&fx, "INV-000005", 700).await;
        handle.notify();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if fx.db.side_effects().count_pending().await.unwrap() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(fx.db.ledger().find_by_reference(fx.company, "INV-000005").await.unwrap().is_some());
    }
}
