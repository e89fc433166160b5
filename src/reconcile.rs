//! Out-of-band repair of sessions whose call and channel disagree with the
//! store.
//!
//! The request path writes the store first and reports platform failures
//! without retrying. This sweep picks up what it left behind: active sessions
//! that were never provisioned get provisioned, and completed sessions whose
//! teardown failed get torn down. Both are safe to repeat.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{db::now_millis, sessions::store, SessionService};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub provisioned: usize,
    /// Pending sessions whose host is gone; they are completed instead.
    pub abandoned: usize,
    pub released: usize,
    pub failed: usize,
}

/// One pass over sessions untouched for at least `grace`.
pub async fn sweep(sessions: &SessionService, grace: Duration) -> anyhow::Result<SweepReport> {
    let grace = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_millis().saturating_sub(grace);
    let mut report = SweepReport::default();

    for (session, host_external_id) in store::unprovisioned(sessions.db_pool(), cutoff).await? {
        let Some(host_external_id) = host_external_id else {
            // Teardown of anything half-created is left to the unreleased pass.
            store::complete(sessions.db_pool(), session.id, now_millis()).await?;
            info!(session_id = %session.id, "host no longer exists, session closed");
            report.abandoned += 1;
            continue;
        };

        match sessions.provision(&session, &host_external_id).await {
            Ok(()) => report.provisioned += 1,
            Err(err) => {
                warn!(session_id = %session.id, error = ?err, "reprovisioning failed");
                report.failed += 1;
            }
        }
    }

    for session in store::unreleased(sessions.db_pool(), cutoff).await? {
        match sessions.teardown(&session).await {
            Ok(()) => report.released += 1,
            Err(err) => {
                warn!(session_id = %session.id, error = ?err, "teardown retry failed");
                report.failed += 1;
            }
        }
    }

    if report != SweepReport::default() {
        info!(?report, "reconciliation sweep finished");
    }
    Ok(report)
}

/// Runs [`sweep`] every `interval`. Abort the handle to stop it.
pub fn spawn(sessions: SessionService, interval: Duration, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = sweep(&sessions, grace).await {
                warn!(error = ?err, "reconciliation sweep failed");
            }
        }
    })
}
