//! Adaptive parameter controller — a long-lived background actor.
//!
//! A single mailbox accepting `{tick, force_update, shutdown}`, whose
//! only output is an atomically swapped immutable snapshot. Readers (the
//! orchestrator) never take a lock on the hot path — `tokio::sync::watch`
//! gives them a lock-free borrow of the latest published snapshot.

use super::insights::{self, Insights};
use super::FeedbackStore;
use crate::domain::{Category, Parameters};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Parameters plus the insights that produced them, published together so
/// a reader never observes a `Parameters` value paired with stale
/// `query_patterns` (used by the per-query nudge).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub parameters: Parameters,
    pub insights: Insights,
}

impl Snapshot {
    fn initial(now: chrono::DateTime<Utc>) -> Self {
        Self {
            parameters: Parameters::default(),
            insights: Insights { query_patterns: Default::default(), knowledge_gaps: Vec::new(), response_quality_trend: 0.0, updated_at: now },
        }
    }
}

enum ControllerCommand {
    Tick,
    ForceUpdate,
    Shutdown,
}

/// Handle to the running controller task. Cloning shares the same
/// mailbox and the same read-only snapshot stream.
#[derive(Clone)]
pub struct AdaptiveController {
    mailbox: mpsc::Sender<ControllerCommand>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
}

async fn run_tick(store: &Arc<dyn FeedbackStore>, lookback_days: i64, current: &Arc<Snapshot>) -> Arc<Snapshot> {
    let now = Utc::now();
    let since = now - chrono::Duration::days(lookback_days);
    let feedback = match store.load_since(since).await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, "failed to load feedback for adaptive controller tick");
            return current.clone();
        }
    };

    let computed = insights::compute_insights(&feedback, now);
    let target = insights::derive_target_parameters(current.parameters, &computed);
    let smoothed = insights::smooth_toward(current.parameters, target);

    tracing::info!(
        retrieval_threshold = smoothed.retrieval_threshold,
        fallback_threshold = smoothed.fallback_threshold,
        web_search_threshold = smoothed.web_search_threshold,
        chunk_limit_adjust = smoothed.chunk_limit_adjust,
        gaps = computed.knowledge_gaps.len(),
        "adaptive controller published a new parameter snapshot"
    );

    Arc::new(Snapshot { parameters: smoothed, insights: computed })
}

impl AdaptiveController {
    /// Spawn the background actor. `tick_interval` defaults to 1 hour;
    /// tests pass something much shorter.
    pub fn spawn(store: Arc<dyn FeedbackStore>, lookback_days: i64, tick_interval: Duration) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::initial(Utc::now())));
        let (mailbox_tx, mut mailbox_rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.tick().await; // first tick fires immediately; consume it without acting.
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let current = snapshot_tx.borrow().clone();
                        let next = run_tick(&store, lookback_days, &current).await;
                        let _ = snapshot_tx.send(next);
                    }
                    command = mailbox_rx.recv() => {
                        match command {
                            Some(ControllerCommand::Tick) | Some(ControllerCommand::ForceUpdate) => {
                                let current = snapshot_tx.borrow().clone();
                                let next = run_tick(&store, lookback_days, &current).await;
                                let _ = snapshot_tx.send(next);
                            }
                            Some(ControllerCommand::Shutdown) | None => break,
                        }
                    }
                }
            }
        });

        Self { mailbox: mailbox_tx, snapshot: snapshot_rx }
    }

    /// Current parameter snapshot. Cheap: a clone out of a watch cell, no
    /// contention with the background tick.
    pub fn current(&self) -> Parameters {
        self.snapshot.borrow().parameters
    }

    pub fn current_insights(&self) -> Insights {
        self.snapshot.borrow().insights.clone()
    }

    /// Force an out-of-schedule tick and wait for the mailbox to accept
    /// it (does not wait for the tick itself to finish).
    pub async fn force_update(&self) {
        let _ = self.mailbox.send(ControllerCommand::ForceUpdate).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.mailbox.send(ControllerCommand::Shutdown).await;
    }

    /// One-off effective snapshot for a single query: the current
    /// snapshot plus a direct (unsmoothed) category nudge.
    pub fn parameters_for(&self, category: Category) -> Parameters {
        let snapshot = self.snapshot.borrow();
        insights::parameters_for_category(snapshot.parameters, category, &snapshot.insights.query_patterns)
    }
}
