use std::{sync::Arc, time::Duration};

use sqlx::SqlitePool;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{error, info, warn};

use crate::stream::ChatDirectory;

use super::{apply, IdentityEvent};

/// How failed events are retried before they are given up on.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub first_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Doubles per failed attempt, capped at `max_delay`.
    fn delay(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.saturating_sub(1).min(16);
        self.first_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug)]
struct Pending {
    event: IdentityEvent,
    attempts: u32,
    due: Instant,
}

struct Consumer {
    db_pool: SqlitePool,
    chat: Arc<dyn ChatDirectory>,
    policy: RetryPolicy,
    /// Failed events in arrival order. Later events for the same account
    /// wait here behind them.
    retries: Vec<Pending>,
}

/// Drains the queue until every [`SyncQueue`](super::SyncQueue) clone is
/// dropped, then gives each event still waiting for a retry one last attempt.
pub fn spawn_consumer(
    db_pool: SqlitePool,
    chat: Arc<dyn ChatDirectory>,
    mut rx: mpsc::Receiver<IdentityEvent>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = Consumer {
            db_pool,
            chat,
            policy,
            retries: Vec::new(),
        };

        loop {
            let next_due = consumer.retries.iter().map(|pending| pending.due).min();

            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => consumer.handle(event).await,
                    None => break,
                },
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    consumer.retry_due().await;
                }
            }
        }

        consumer.flush().await;
        info!("identity sync consumer stopped");
    })
}

impl Consumer {
    fn blocked(&self, external_id: &str) -> Option<Instant> {
        self.retries
            .iter()
            .find(|pending| pending.event.external_id() == external_id)
            .map(|pending| pending.due)
    }

    async fn handle(&mut self, event: IdentityEvent) {
        if let Some(due) = self.blocked(event.external_id()) {
            self.retries.push(Pending { event, attempts: 0, due });
            return;
        }
        self.attempt(event, 0).await;
    }

    /// Applies once; on failure the event goes (back) on the retry list.
    async fn attempt(&mut self, event: IdentityEvent, attempts: u32) {
        let Err(err) = apply(&self.db_pool, self.chat.as_ref(), &event).await else {
            return;
        };

        let attempts = attempts + 1;
        if attempts >= self.policy.max_attempts {
            error!(?event, attempts, error = ?err, "identity event abandoned");
            return;
        }

        let delay = self.policy.delay(attempts);
        warn!(?event, attempts, ?delay, error = ?err, "identity event failed, will retry");
        self.retries.push(Pending {
            event,
            attempts,
            due: Instant::now() + delay,
        });
    }

    async fn retry_due(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retries)
            .into_iter()
            .partition(|pending| pending.due <= now);
        self.retries = waiting;

        for pending in due {
            if let Some(due) = self.blocked(pending.event.external_id()) {
                self.retries.push(Pending { due, ..pending });
                continue;
            }
            self.attempt(pending.event, pending.attempts).await;
        }
    }

    async fn flush(&mut self) {
        let mut failed: Vec<String> = Vec::new();

        for pending in std::mem::take(&mut self.retries) {
            let external_id = pending.event.external_id().to_owned();
            if failed.contains(&external_id) {
                error!(event = ?pending.event, "identity event dropped at shutdown");
                continue;
            }
            if let Err(err) = apply(&self.db_pool, self.chat.as_ref(), &pending.event).await {
                error!(event = ?pending.event, error = ?err, "identity event dropped at shutdown");
                failed.push(external_id);
            }
        }
    }
}
