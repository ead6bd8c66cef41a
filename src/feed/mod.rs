//! Live vehicle feed client.
//!
//! The connection runs in its own task, spawned once at startup. A
//! [`FeedHandle`] is the only way in: `start_streaming` registers a message
//! channel and opens the stream, `stop_streaming` tears it down. Both are
//! safe to call at any time and in any state.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub mod sse;
pub mod types;

mod client;
mod worker;

use types::{StreamOptions, WorkerMessage};
use worker::Command;

/// Channel on which a consumer receives stream messages
pub type MessageSender = mpsc::UnboundedSender<WorkerMessage>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("stream worker is no longer running")]
    WorkerGone,
}

/// Cloneable handle to the stream worker task
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl FeedHandle {
    /// Ask the worker to stream from the given target, delivering messages
    /// on `messages`. Returns once the worker has taken the request; it does
    /// not wait for the connection to open.
    pub async fn start_streaming(
        &self,
        options: StreamOptions,
        messages: MessageSender,
    ) -> Result<(), RelayError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Start {
                options,
                messages,
                ack: ack_tx,
            })
            .map_err(|_| RelayError::WorkerGone)?;
        ack_rx.await.map_err(|_| RelayError::WorkerGone)
    }

    /// Ask the worker to close the stream. Returns once teardown is done.
    pub async fn stop_streaming(&self) -> Result<(), RelayError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Stop { ack: ack_tx })
            .map_err(|_| RelayError::WorkerGone)?;
        ack_rx.await.map_err(|_| RelayError::WorkerGone)
    }
}

/// Spawn the stream worker and return a handle to it
pub fn spawn(base_url: String) -> FeedHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let worker = worker::FeedWorker::new(base_url);
    tokio::spawn(worker.run(commands_rx));
    FeedHandle {
        commands: commands_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::types::ConnectionState;
    use super::*;

    fn make_options() -> StreamOptions {
        StreamOptions {
            api_key: "test-key".to_string(),
            endpoint: "vehicles".to_string(),
            filter_params: None,
        }
    }

    #[tokio::test]
    async fn test_start_ack_follows_connecting() {
        let handle = spawn("http://127.0.0.1:9".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.start_streaming(make_options(), tx).await.unwrap();
        // the worker reports connecting before acknowledging the start
        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerMessage::Status(ConnectionState::Connecting)
        );
        handle.stop_streaming().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_fail_once_worker_is_gone() {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        drop(commands_rx);
        let handle = FeedHandle {
            commands: commands_tx,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            handle.start_streaming(make_options(), tx).await,
            Err(RelayError::WorkerGone)
        ));
        assert!(matches!(
            handle.stop_streaming().await,
            Err(RelayError::WorkerGone)
        ));
    }
}
