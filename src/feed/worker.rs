//! Owner of the streaming connection and its lifecycle.
//!
//! All connection state lives in one task. Consumers talk to it through
//! commands and receive messages on the callback channel registered with the
//! most recent start. Only one session and one callback exist at a time.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{self, TransportEvent};
use super::sse::SseEvent;
use super::types::{ConnectionState, FeedEvent, StreamOptions, WorkerMessage};
use super::MessageSender;

/// Control messages accepted by the worker
#[derive(Debug)]
pub(crate) enum Command {
    Start {
        options: StreamOptions,
        messages: MessageSender,
        ack: oneshot::Sender<()>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// One live streaming connection
struct Session {
    /// Fully-qualified stream URL, used to recognize repeated starts
    url: String,
    endpoint: String,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: JoinHandle<()>,
}

pub(crate) struct FeedWorker {
    http: reqwest::Client,
    base_url: String,
    callback: Option<MessageSender>,
    session: Option<Session>,
}

/// What woke the worker loop
enum Step {
    Cmd(Option<Command>),
    Ev(Option<TransportEvent>),
}

impl FeedWorker {
    pub(crate) fn new(base_url: String) -> Self {
        FeedWorker {
            http: reqwest::Client::new(),
            base_url,
            callback: None,
            session: None,
        }
    }

    /// Process commands and transport events until every command sender is
    /// dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let step = match self.session.as_mut() {
                Some(session) => tokio::select! {
                    command = commands.recv() => Step::Cmd(command),
                    event = session.events.recv() => Step::Ev(event),
                },
                None => Step::Cmd(commands.recv().await),
            };
            match step {
                Step::Cmd(Some(command)) => self.handle_command(command),
                Step::Cmd(None) => break,
                Step::Ev(Some(event)) => self.handle_transport_event(event),
                Step::Ev(None) => self.fail_session("stream ended unexpectedly".to_string()),
            }
        }
        debug!("stream worker shutting down");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                options,
                messages,
                ack,
            } => {
                self.start_session(options, messages);
                let _ = ack.send(());
            }
            Command::Stop { ack } => {
                self.stop_session();
                let _ = ack.send(());
            }
        }
    }

    /// Open a connection to the requested target. A start against the target
    /// of the live session is a no-op; a start against a different target
    /// replaces the session without reporting on the old one.
    fn start_session(&mut self, options: StreamOptions, messages: MessageSender) {
        self.callback = Some(messages);

        let url = options.feed_url(&self.base_url);
        if let Some(session) = &self.session {
            if session.url == url {
                debug!(endpoint = %options.endpoint, "stream already connected to this target");
                return;
            }
        }

        self.close_transport();
        self.report_status(ConnectionState::Connecting);
        info!(endpoint = %options.endpoint, "connecting to vehicle stream");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(client::run_transport(
            self.http.clone(),
            url.clone(),
            events_tx,
        ));
        self.session = Some(Session {
            url,
            endpoint: options.endpoint,
            events: events_rx,
            task,
        });
    }

    /// Tear down the live session, report closed, then deregister the
    /// callback so nothing stale reaches a later subscriber. Without a live
    /// session this does nothing.
    fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("stop requested with no active stream");
            return;
        };
        session.task.abort();
        info!(endpoint = %session.endpoint, "vehicle stream stopped");
        self.report_status(ConnectionState::Closed);
        self.callback = None;
    }

    fn close_transport(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if let Some(session) = &self.session {
                    info!(endpoint = %session.endpoint, "vehicle stream open");
                }
                self.report_status(ConnectionState::Open);
            }
            TransportEvent::Event(frame) => self.dispatch_frame(frame),
            TransportEvent::Failed(reason) => self.fail_session(reason),
        }
    }

    /// Report the failure, then drop the session. The callback stays
    /// registered so the consumer can decide whether to start again.
    fn fail_session(&mut self, reason: String) {
        warn!(error = %reason, "vehicle stream failed");
        self.report_status(ConnectionState::Error);
        self.emit(WorkerMessage::Error(reason));
        self.close_transport();
    }

    /// Parse failures are reported but never end the session
    fn dispatch_frame(&mut self, frame: SseEvent) {
        match FeedEvent::parse(&frame.event, &frame.data) {
            Ok(Some(event)) => {
                debug!(event = %event.event_name(), "relaying stream event");
                self.emit(WorkerMessage::Data(event));
            }
            Ok(None) => {
                warn!(event = %frame.event, "ignoring unrecognized stream event type");
            }
            Err(e) => {
                warn!(event = %frame.event, error = %e, "failed to parse stream event payload");
                self.emit(WorkerMessage::Error(format!(
                    "error parsing {} event: {}",
                    frame.event, e
                )));
            }
        }
    }

    fn report_status(&self, state: ConnectionState) {
        self.emit(WorkerMessage::Status(state));
    }

    fn emit(&self, message: WorkerMessage) {
        if let Some(callback) = &self.callback {
            // Ignore send errors - they just mean no one is listening
            let _ = callback.send(message);
        }
    }
}
