//! Deadline-driven wakeup scheduler.
//!
//! Flows never hold a timer thread: a sleep stores its deadline in the
//! checkpoint and emits a `ScheduleWakeup` record. This scheduler consumes
//! those deadlines and delivers a wakeup for the flow at or after each one,
//! through a registered async callback (the embedder enqueues the event on
//! the flow event topic).
//!
//! Re-arming a flow's deadline cancels the previous one; terminal flows are
//! cancelled explicitly. After a restart the embedder re-arms deadlines from
//! `CheckpointStore::list_active`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use ledgerflow_types::event::FlowId;
use tokio_util::sync::CancellationToken;

/// Callback type invoked when a deadline fires.
pub type WakeupCallback =
    Arc<dyn Fn(FlowId, DateTime<Utc>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Delivers wakeups for stored deadlines, one armed task per flow.
pub struct WakeupScheduler {
    callback: WakeupCallback,
    /// Armed deadlines: flow_id -> cancellation for the pending task.
    armed: Arc<DashMap<FlowId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl WakeupScheduler {
    pub fn new(callback: WakeupCallback) -> Self {
        Self {
            callback,
            armed: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Arm (or re-arm) the wakeup deadline for a flow. A deadline in the
    /// past fires immediately.
    pub fn arm(&self, flow_id: FlowId, deadline: DateTime<Utc>) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.armed.insert(flow_id.clone(), token.clone()) {
            previous.cancel();
        }

        let delay = (deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let callback = Arc::clone(&self.callback);
        let armed = Arc::clone(&self.armed);

        tracing::debug!(flow_id = %flow_id, deadline = %deadline, "armed wakeup");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    armed.remove(&flow_id);
                    tracing::debug!(flow_id = %flow_id, "wakeup deadline fired");
                    callback(flow_id, deadline).await;
                }
            }
        });
    }

    /// Cancel the armed deadline for a flow (no-op when none is armed).
    pub fn cancel(&self, flow_id: &FlowId) {
        if let Some((_, token)) = self.armed.remove(flow_id) {
            token.cancel();
            tracing::debug!(flow_id = %flow_id, "wakeup cancelled");
        }
    }

    /// Number of currently armed deadlines.
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Cancel every armed deadline and refuse further fires.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.armed.clear();
        tracing::info!("wakeup scheduler shut down");
    }
}
