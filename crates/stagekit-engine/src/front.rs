//! Concurrent staging front-end
//!
//! Wraps the lifecycle manager with a fixed pool of worker tasks fed by a
//! bounded queue, taking stage-creation latency off the caller's critical
//! path while bounding outstanding work. Backpressure policy: try to
//! enqueue, wait briefly for space, then fall back to executing on a
//! detached task so no request is ever dropped.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::StagingEngine;
use crate::metrics::{self, StageEvent, StagingSummary};
use futures::future::join_all;
use stagekit_model::Stage;
use stagekit_store::RecordStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct StageRequest {
    stage: Stage,
    reply: oneshot::Sender<Result<Stage, EngineError>>,
}

/// Single-use completion handle for an async staging request.
///
/// Exactly one result is ever delivered; if the pool shuts down or the
/// request is cancelled before a worker accepts it, waiting yields
/// [`EngineError::Cancelled`].
#[derive(Debug)]
pub struct StageHandle {
    rx: oneshot::Receiver<Result<Stage, EngineError>>,
}

impl StageHandle {
    /// Wait for the request to complete.
    pub async fn wait(self) -> Result<Stage, EngineError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Cancelled),
        }
    }
}

/// Staging front-end with a bounded queue and a fixed worker pool.
///
/// Worker count defaults to the persistence layer's connection budget; the
/// queue bounds outstanding creations. Requests that cannot be queued
/// within [`EngineConfig::enqueue_wait`] run on a detached task instead.
pub struct AsyncStagingEngine<S: RecordStore> {
    engine: Arc<StagingEngine<S>>,
    config: EngineConfig,
    queue_tx: mpsc::Sender<StageRequest>,
    events_tx: mpsc::Sender<StageEvent>,
    workers: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<()>,
    summary_rx: watch::Receiver<StagingSummary>,
}

impl<S: RecordStore> AsyncStagingEngine<S> {
    /// Start the worker pool and metrics aggregator over `store`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let engine = Arc::new(StagingEngine::new(store, config.clone()));

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        // Generous relative to the pool so event emission never applies
        // false backpressure to workers.
        let event_capacity = config.queue_capacity.max(config.workers * 4);
        let (events_tx, events_rx) = mpsc::channel(event_capacity);
        let (summary_tx, summary_rx) = watch::channel(StagingSummary::default());

        let mut workers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                engine.clone(),
                queue_rx.clone(),
                events_tx.clone(),
            )));
        }
        let aggregator = tokio::spawn(metrics::aggregate(
            events_rx,
            config.metrics_interval,
            summary_tx,
            config.debug,
        ));

        tracing::info!(
            workers = config.workers,
            queue = config.queue_capacity,
            "staging worker pool started"
        );

        Self {
            engine,
            config,
            queue_tx,
            events_tx,
            workers,
            aggregator,
            summary_rx,
        }
    }

    /// The wrapped lifecycle manager, for the synchronous apply-side calls.
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &StagingEngine<S> {
        &self.engine
    }

    /// Latest staging throughput summary.
    #[must_use]
    pub fn metrics(&self) -> watch::Receiver<StagingSummary> {
        self.summary_rx.clone()
    }

    /// Stage a transformation without blocking on its creation.
    ///
    /// Returns once the request is queued, which normally is immediate.
    /// With a saturated queue the call waits up to the configured enqueue
    /// timeout, then downgrades to synchronous execution on a detached
    /// task; either way the returned handle resolves with the outcome.
    pub async fn create_stage_async(&self, stage: Stage) -> StageHandle {
        let (reply, rx) = oneshot::channel();
        let req = StageRequest { stage, reply };

        match self.queue_tx.try_send(req) {
            Ok(()) => {}
            Err(TrySendError::Full(req)) => {
                match self
                    .queue_tx
                    .send_timeout(req, self.config.enqueue_wait)
                    .await
                {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(req)) => self.spawn_inline(req),
                    Err(SendTimeoutError::Closed(req)) => {
                        let _ = req.reply.send(Err(EngineError::Cancelled));
                    }
                }
            }
            Err(TrySendError::Closed(req)) => {
                let _ = req.reply.send(Err(EngineError::Cancelled));
            }
        }

        StageHandle { rx }
    }

    /// Like [`Self::create_stage_async`], additionally honoring `cancel`.
    ///
    /// If the token fires before a worker accepts the request, the handle
    /// resolves with [`EngineError::Cancelled`]. A request already handed
    /// to a worker runs to completion; cancellation is never preemptive
    /// mid-write.
    pub async fn create_stage_async_with_cancel(
        &self,
        stage: Stage,
        cancel: CancellationToken,
    ) -> StageHandle {
        let (reply, rx) = oneshot::channel();
        if cancel.is_cancelled() {
            let _ = reply.send(Err(EngineError::Cancelled));
            return StageHandle { rx };
        }
        let req = StageRequest { stage, reply };

        match self.queue_tx.try_send(req) {
            Ok(()) => {}
            Err(TrySendError::Full(req)) => {
                tokio::select! {
                    result = self.queue_tx.send_timeout(req, self.config.enqueue_wait) => {
                        match result {
                            Ok(()) => {}
                            Err(SendTimeoutError::Timeout(req)) => {
                                if cancel.is_cancelled() {
                                    let _ = req.reply.send(Err(EngineError::Cancelled));
                                } else {
                                    self.spawn_inline(req);
                                }
                            }
                            Err(SendTimeoutError::Closed(req)) => {
                                let _ = req.reply.send(Err(EngineError::Cancelled));
                            }
                        }
                    }
                    // Dropping the pending send drops the request and its
                    // reply sender; the handle then resolves cancelled.
                    () = cancel.cancelled() => {}
                }
            }
            Err(TrySendError::Closed(req)) => {
                let _ = req.reply.send(Err(EngineError::Cancelled));
            }
        }

        StageHandle { rx }
    }

    /// Stage many transformations concurrently.
    ///
    /// Returns one outcome per input, in input order. Partial failure is
    /// expected; the batch itself never fails atomically.
    pub async fn batch_create_stages(
        &self,
        stages: Vec<Stage>,
    ) -> Vec<Result<Stage, EngineError>> {
        let mut handles = Vec::with_capacity(stages.len());
        for stage in stages {
            handles.push(self.create_stage_async(stage).await);
        }
        join_all(handles.into_iter().map(StageHandle::wait)).await
    }

    /// Shut the pool down: stop intake, drain every queued request, wait
    /// for workers and the aggregator to finish.
    ///
    /// Consuming `self` makes a second close unrepresentable. Detached
    /// fallback tasks still in flight are also drained before the
    /// aggregator exits.
    pub async fn close(self) {
        let Self {
            queue_tx,
            events_tx,
            workers,
            aggregator,
            ..
        } = self;

        drop(queue_tx);
        for worker in workers {
            let _ = worker.await;
        }
        drop(events_tx);
        let _ = aggregator.await;
        tracing::info!("staging worker pool drained");
    }

    /// Queue saturated and the timed wait elapsed: run the creation on a
    /// detached task so the request is never dropped.
    fn spawn_inline(&self, req: StageRequest) {
        tracing::debug!("staging queue saturated, falling back to inline execution");
        let engine = self.engine.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            process(&engine, &events, req).await;
        });
    }
}

async fn worker_loop<S: RecordStore>(
    engine: Arc<StagingEngine<S>>,
    queue: Arc<Mutex<mpsc::Receiver<StageRequest>>>,
    events: mpsc::Sender<StageEvent>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next request.
        let next = { queue.lock().await.recv().await };
        match next {
            Some(req) => process(&engine, &events, req).await,
            None => return,
        }
    }
}

async fn process<S: RecordStore>(
    engine: &StagingEngine<S>,
    events: &mpsc::Sender<StageEvent>,
    req: StageRequest,
) {
    let started = Instant::now();
    let result = engine.create_stage(req.stage).await;
    let event = StageEvent {
        stage_id: result.as_ref().ok().map(|stage| stage.id.clone()),
        failed: result.is_err(),
        latency: started.elapsed(),
    };
    // Deliver the caller's result before accounting; the caller may have
    // gone away, which is fine.
    let _ = req.reply.send(result);
    let _ = events.send(event).await;
}
