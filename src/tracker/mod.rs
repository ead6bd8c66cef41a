//! Stream consumer that maintains the live vehicle picture.
//!
//! One tracker task owns the message channel registered with the feed
//! worker. It folds events into a [`store::VehicleStore`], publishes a fresh
//! snapshot after every change, and schedules reconnects when the stream
//! fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geojson::FeatureCollection;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::feed::types::{ConnectionState, StreamOptions, WorkerMessage};
use crate::feed::FeedHandle;

pub mod store;

use store::VehicleStore;

const MAX_RECONNECT_DELAY_SECS: u64 = 60;
const NOTICE_CHANNEL_SIZE: usize = 16;

/// A non-fatal stream problem worth surfacing to clients
#[derive(Debug, Clone, Serialize)]
pub struct StreamNotice {
    pub message: String,
    pub at: String,
}

pub type SnapshotReceiver = watch::Receiver<Arc<FeatureCollection>>;
pub type StatusReceiver = watch::Receiver<ConnectionState>;

pub struct VehicleTracker {
    handle: FeedHandle,
    feed: FeedConfig,
    snapshot_tx: watch::Sender<Arc<FeatureCollection>>,
    status_tx: watch::Sender<ConnectionState>,
    notices_tx: broadcast::Sender<StreamNotice>,
}

impl VehicleTracker {
    pub fn new(feed: FeedConfig) -> Self {
        let handle = crate::feed::spawn(feed.base_url.clone());
        let empty = FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(empty));
        let (status_tx, _) = watch::channel(ConnectionState::Idle);
        let (notices_tx, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        VehicleTracker {
            handle,
            feed,
            snapshot_tx,
            status_tx,
            notices_tx,
        }
    }

    /// Latest vehicle snapshot, updated after every applied event
    pub fn snapshot(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    /// Current connection state of the upstream stream
    pub fn status(&self) -> StatusReceiver {
        self.status_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Sender<StreamNotice> {
        self.notices_tx.clone()
    }

    /// Consume stream messages until the feed worker goes away.
    ///
    /// Reconnects are this consumer's job: the worker reports a failure and
    /// forgets about it, and the tracker starts a new session after a delay
    /// that grows with consecutive failures.
    pub async fn run(self: Arc<Self>) {
        let Some(api_key) = self.feed.api_key.clone() else {
            warn!("no feed api_key configured, live vehicle stream disabled");
            return;
        };
        let options = StreamOptions {
            api_key,
            endpoint: self.feed.endpoint.clone(),
            filter_params: self.feed.filter_params.clone(),
        };

        let (messages_tx, mut messages_rx) = mpsc::unbounded_channel();
        if let Err(e) = self
            .handle
            .start_streaming(options.clone(), messages_tx.clone())
            .await
        {
            error!(error = %e, "failed to start vehicle stream");
            return;
        }

        let mut store = VehicleStore::new();
        let mut attempts: u32 = 0;
        let mut reconnect_at: Option<Instant> = None;

        loop {
            let reconnect = async {
                match reconnect_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                message = messages_rx.recv() => {
                    let Some(message) = message else { break };
                    match message {
                        WorkerMessage::Status(state) => {
                            debug!(state = state.as_str(), "stream status changed");
                            self.status_tx.send_replace(state);
                            match state {
                                ConnectionState::Open => {
                                    if attempts > 0 {
                                        info!("vehicle stream recovered");
                                    }
                                    attempts = 0;
                                    reconnect_at = None;
                                }
                                ConnectionState::Error if self.feed.reconnect => {
                                    attempts += 1;
                                    let delay = reconnect_delay(self.feed.reconnect_delay_secs, attempts);
                                    warn!(
                                        attempt = attempts,
                                        delay_secs = delay.as_secs(),
                                        "vehicle stream lost, reconnect scheduled"
                                    );
                                    reconnect_at = Some(Instant::now() + delay);
                                }
                                _ => {}
                            }
                        }
                        WorkerMessage::Data(event) => {
                            store.apply(event);
                            let snapshot = store.to_feature_collection();
                            debug!(vehicles = snapshot.features.len(), "applied stream event");
                            self.snapshot_tx.send_replace(Arc::new(snapshot));
                        }
                        WorkerMessage::Error(reason) => {
                            warn!(error = %reason, "vehicle stream reported an error");
                            // Ignore send errors - they just mean no one is listening
                            let _ = self.notices_tx.send(StreamNotice {
                                message: reason,
                                at: Utc::now().to_rfc3339(),
                            });
                        }
                    }
                }
                _ = reconnect => {
                    reconnect_at = None;
                    info!(attempt = attempts, "reconnecting to vehicle stream");
                    if let Err(e) = self
                        .handle
                        .start_streaming(options.clone(), messages_tx.clone())
                        .await
                    {
                        error!(error = %e, "failed to restart vehicle stream");
                        break;
                    }
                }
            }
        }
        debug!("vehicle tracker loop ended");
    }

    /// Close the stream and report closed to anyone watching the status
    pub async fn stop(&self) {
        if let Err(e) = self.handle.stop_streaming().await {
            warn!(error = %e, "could not stop vehicle stream cleanly");
        }
    }
}

fn reconnect_delay(base_secs: u64, attempt: u32) -> Duration {
    let secs = base_secs
        .saturating_mul(attempt as u64)
        .clamp(1, MAX_RECONNECT_DELAY_SECS);
    Duration::from_secs(secs)
}
