//! HTTP transport for one streaming session.
//!
//! A session is a single long-lived GET request whose body is parsed
//! incrementally as server-sent events. The transport never retries on its
//! own; it reports what happened and lets the worker decide.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::sse::{SseDecoder, SseEvent};

/// What the transport observed, in the order it observed it
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// The stream responded with a success status and is delivering a body
    Opened,
    /// One complete server-sent event
    Event(SseEvent),
    /// The connection failed or ended. Terminal for this session.
    Failed(String),
}

/// Drive one streaming connection to completion, reporting progress on
/// `events`. Returns when the connection ends or the session is dropped.
pub(crate) async fn run_transport(
    client: reqwest::Client,
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let response = match client
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let _ = events.send(TransportEvent::Failed(format!("connection failed: {}", e)));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = events.send(TransportEvent::Failed(format!("stream HTTP {}", status)));
        return;
    }

    if events.send(TransportEvent::Opened).is_err() {
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = events.send(TransportEvent::Failed(format!("stream read error: {}", e)));
                return;
            }
        };
        for frame in decoder.push(&chunk) {
            debug!(event = %frame.event, "received stream event");
            if events.send(TransportEvent::Event(frame)).is_err() {
                // Session dropped by the worker, stop reading
                return;
            }
        }
    }

    let _ = events.send(TransportEvent::Failed(
        "stream ended by server".to_string(),
    ));
}
