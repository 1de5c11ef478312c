use crate::generator::restamp;
use crate::gui_bridge::GuiBridge;
use crate::workflow::config::WorkflowConfig;
use crate::workflow::runner::lock;
use anyhow::Context;
use fusioncore::engine::ShutdownReport;
use fusioncore::prelude::unix_now;
use fusioncore::telemetry::MetricsSnapshot;
use fusioncore::{ClassificationWorker, FusionEngine, IngestStatus, StreamRecord};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct LiveReport {
    pub ingested: usize,
    pub classified: usize,
    pub shutdown: ShutdownReport,
    pub metrics: MetricsSnapshot,
}

/// Wall-clock mode: records arrive over a channel, a timer drives
/// eligibility, retirement and trigger dispatch, and the classification
/// worker runs as its own task.
pub struct LiveRuntime {
    config: WorkflowConfig,
}

impl LiveRuntime {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Runs until `stop` resolves, then shuts every task down in order.
    ///
    /// `feed` is replayed against the wall clock, keeping its recorded
    /// spacing. With `serve` the HTTP bridge accepts further records.
    pub async fn run<S>(
        &self,
        engine: FusionEngine,
        feed: Vec<StreamRecord>,
        serve: bool,
        stop: S,
    ) -> anyhow::Result<LiveReport>
    where
        S: Future<Output = ()>,
    {
        let runtime = &self.config.runtime;
        let engine = Arc::new(Mutex::new(engine));
        let worker = ClassificationWorker::new(Arc::clone(&engine)).context("fitting classifier")?;
        let (record_tx, record_rx) = mpsc::channel(runtime.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ingest = tokio::spawn(ingest_loop(
            Arc::clone(&engine),
            record_rx,
            shutdown_rx.clone(),
        ));
        let housekeeping = tokio::spawn(housekeeping_loop(
            Arc::clone(&engine),
            runtime.sweep_interval(),
            shutdown_rx.clone(),
        ));
        let classifier = tokio::spawn(worker.run());
        let replay = tokio::spawn(feed_loop(feed, record_tx.clone(), shutdown_rx.clone()));
        let bridge = if serve {
            let addr: SocketAddr = runtime
                .bind
                .parse()
                .with_context(|| format!("parsing bridge address {}", runtime.bind))?;
            let bridge = GuiBridge::new(Arc::clone(&engine), record_tx.clone());
            Some(tokio::spawn(bridge.serve(addr, shutdown_rx.clone())))
        } else {
            None
        };
        drop(record_tx);

        stop.await;
        log::info!("stopping live runtime");
        let _ = shutdown_tx.send(true);

        replay.await.context("feed task panicked")?;
        if let Some(bridge) = bridge {
            bridge.await.context("bridge task panicked")??;
        }
        let ingested = ingest.await.context("ingest task panicked")??;
        housekeeping.await.context("housekeeping task panicked")??;

        let shutdown = lock(&engine)?
            .shutdown()
            .context("shutting down engine")?;
        let classified = classifier
            .await
            .context("classification task panicked")?
            .context("classification worker failed")?;

        let engine = lock(&engine)?;
        if let Some(path) = &runtime.history_out {
            engine
                .history()
                .save_csv(path)
                .with_context(|| format!("exporting classifier history {}", path.display()))?;
            log::info!(
                "exported {} historical targets to {}",
                engine.history().len(),
                path.display()
            );
        }
        Ok(LiveReport {
            ingested,
            classified,
            shutdown,
            metrics: engine.metrics().snapshot(),
        })
    }
}

async fn ingest_loop(
    engine: Arc<Mutex<FusionEngine>>,
    mut records: mpsc::Receiver<StreamRecord>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<usize> {
    let mut accepted = 0;
    loop {
        tokio::select! {
            record = records.recv() => match record {
                Some(record) => {
                    let report = lock(&engine)?
                        .ingest(record)
                        .context("ingesting record")?;
                    if report.status == IngestStatus::Accepted {
                        accepted += 1;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    log::debug!("ingest loop finished after {} records", accepted);
    Ok(accepted)
}

async fn housekeeping_loop(
    engine: Arc<Mutex<FusionEngine>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = unix_now();
                let mut guard = lock(&engine)?;
                let report = guard.sweep(now).context("sweeping targets")?;
                guard.flush(now).context("flushing triggers")?;
                if !report.retired.is_empty() {
                    log::debug!("retired {} targets", report.retired.len());
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

/// Sends `feed` into the ingest channel, spaced as recorded and restamped
/// to the wall clock.
async fn feed_loop(
    feed: Vec<StreamRecord>,
    records: mpsc::Sender<StreamRecord>,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(first) = feed.first().map(StreamRecord::timestamp) else {
        return;
    };
    let offset = unix_now() - first;
    let started = Instant::now();
    let count = feed.len();
    for mut record in feed {
        let due = started + Duration::from_secs_f64((record.timestamp() - first).max(0.0));
        restamp(&mut record, offset);
        tokio::select! {
            _ = tokio::time::sleep_until(due) => {}
            _ = shutdown.changed() => return,
        }
        if records.send(record).await.is_err() {
            return;
        }
    }
    log::info!("synthetic feed finished ({} records)", count);
}
