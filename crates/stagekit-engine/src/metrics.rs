//! Staging metrics aggregation
//!
//! One long-lived task drains completion events from the worker pool,
//! accumulates counters, and periodically emits a summary through
//! `tracing`. The latest summary is also published on a `watch` channel so
//! embedders can observe throughput without parsing logs. The aggregator is
//! purely observational: nothing in the apply path waits on it, and its
//! loop ends when the last event producer hangs up.

use stagekit_model::StageId;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Completion event emitted by a worker after finishing one request.
#[derive(Debug)]
pub(crate) struct StageEvent {
    pub(crate) stage_id: Option<StageId>,
    pub(crate) failed: bool,
    pub(crate) latency: Duration,
}

/// Rolling summary of staging throughput since the pool started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingSummary {
    /// Requests processed, successes and failures alike.
    pub total_stages: u64,
    /// Requests that returned an error.
    pub error_count: u64,
    /// Mean creation latency.
    pub avg_latency: Duration,
    /// Worst creation latency observed.
    pub max_latency: Duration,
}

pub(crate) async fn aggregate(
    mut events: mpsc::Receiver<StageEvent>,
    interval: Duration,
    summary_tx: watch::Sender<StagingSummary>,
    verbose: bool,
) {
    let mut summary = StagingSummary::default();
    let mut total_latency = Duration::ZERO;
    let mut since_last_tick = 0u64;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                summary.total_stages += 1;
                since_last_tick += 1;
                total_latency += event.latency;
                if event.failed {
                    summary.error_count += 1;
                }
                if event.latency > summary.max_latency {
                    summary.max_latency = event.latency;
                }
                summary.avg_latency = total_latency
                    / u32::try_from(summary.total_stages).unwrap_or(u32::MAX);
                let _ = summary_tx.send(summary.clone());
                if let Some(stage) = &event.stage_id {
                    tracing::trace!(stage = %stage, latency = ?event.latency, "stage processed");
                }
            }
            _ = ticker.tick() => {
                if since_last_tick > 0 {
                    emit(&summary, verbose);
                    since_last_tick = 0;
                }
            }
        }
    }

    // Final summary on shutdown so short-lived pools still report.
    if summary.total_stages > 0 {
        emit(&summary, verbose);
    }
}

fn emit(summary: &StagingSummary, verbose: bool) {
    if verbose {
        tracing::info!(
            total = summary.total_stages,
            errors = summary.error_count,
            avg = ?summary.avg_latency,
            max = ?summary.max_latency,
            "staging metrics"
        );
    } else {
        tracing::debug!(
            total = summary.total_stages,
            errors = summary.error_count,
            avg = ?summary.avg_latency,
            max = ?summary.max_latency,
            "staging metrics"
        );
    }
}
