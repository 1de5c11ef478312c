use crate::gui_bridge::model::TargetsView;
use crate::workflow::runner::lock;
use anyhow::Context;
use fusioncore::{FusionEngine, StreamRecord};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use warp::{http::StatusCode, Filter};

/// HTTP bridge: accepts records from external decoders and exposes the
/// live target table.
pub struct GuiBridge {
    engine: Arc<Mutex<FusionEngine>>,
    records: mpsc::Sender<StreamRecord>,
}

impl GuiBridge {
    pub fn new(engine: Arc<Mutex<FusionEngine>>, records: mpsc::Sender<StreamRecord>) -> Self {
        Self { engine, records }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let records = self.records.clone();
        let records_filter = warp::any().map(move || records.clone());
        let engine = Arc::clone(&self.engine);
        let engine_filter = warp::any().map(move || Arc::clone(&engine));

        let ingest_route = warp::path("ingest")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(records_filter)
            .and_then(
                |record: StreamRecord, records: mpsc::Sender<StreamRecord>| async move {
                    let reply = match records.send(record).await {
                        Ok(()) => warp::reply::with_status(
                            warp::reply::json(&json!({"status": "queued"})),
                            StatusCode::ACCEPTED,
                        ),
                        Err(_) => {
                            log::warn!("[bridge] ingest channel closed, record refused");
                            warp::reply::with_status(
                                warp::reply::json(&json!({"status": "closed"})),
                                StatusCode::SERVICE_UNAVAILABLE,
                            )
                        }
                    };
                    Ok::<_, warp::Rejection>(reply)
                },
            );

        let targets_route = warp::path("targets")
            .and(warp::path::end())
            .and(warp::get())
            .and(engine_filter)
            .map(|engine: Arc<Mutex<FusionEngine>>| match targets_view(&engine) {
                Ok(view) => warp::reply::with_status(warp::reply::json(&view), StatusCode::OK),
                Err(err) => {
                    log::warn!("[bridge] target snapshot failed: {:#}", err);
                    warp::reply::with_status(
                        warp::reply::json(&json!({"error": err.to_string()})),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                }
            });

        ingest_route.or(targets_route)
    }

    /// Serves until the shutdown flag flips.
    pub async fn serve(
        self,
        addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown.changed().await;
            })
            .with_context(|| format!("binding gui bridge to {addr}"))?;
        log::info!("[bridge] listening on http://{}", bound);
        server.await;
        log::info!("[bridge] stopped");
        Ok(())
    }
}

fn targets_view(engine: &Mutex<FusionEngine>) -> anyhow::Result<TargetsView> {
    let engine = lock(engine)?;
    Ok(TargetsView {
        targets: engine.snapshot()?,
        pending_triggers: engine.pending_triggers(),
        metrics: engine.metrics().snapshot(),
        tables: engine.table_usage(),
    })
}
