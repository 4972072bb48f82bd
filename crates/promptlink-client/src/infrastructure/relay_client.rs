//! The reconnecting client: one driver task per [`RelayClient`].
//!
//! # How it runs (for beginners)
//!
//! ```text
//! RelayClient ──Command──► driver task ──ClientEvent──► host UI
//!                             │
//!                             ├─ ReconnectStateMachine  (when to retry)
//!                             ├─ ClientSession          (what to send)
//!                             └─ Connector / Link       (how to send it)
//! ```
//!
//! The driver owns all state, so nothing is shared between tasks.  Callers
//! talk to it only through the command channel, and commands keep being
//! served while the driver waits for a connect, a retry delay, or a manual
//! reconnect after `Failed`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use promptlink_core::protocol::{decode_server_message, encode_client_message};
use promptlink_core::{
    unix_millis, ClientMessage, PromptSink, ReconnectAction, ReconnectStateMachine,
};

use crate::application::session::{ClientSession, Heartbeat, Submit};
use crate::domain::{ClientConfig, ClientError, ClientEvent, SubmitOutcome};
use crate::infrastructure::transport::{Connector, Link, WsConnector};

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Reconnect,
    Shutdown,
}

/// Handle to a running client.
///
/// Dropping the handle stops the driver at its next command poll.
pub struct RelayClient {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl RelayClient {
    /// Starts a client over WebSocket.
    pub fn connect(
        config: ClientConfig,
        sink: Option<Arc<dyn PromptSink>>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        Self::spawn(config, Arc::new(WsConnector), sink)
    }

    /// Starts a client over any [`Connector`].
    ///
    /// `sink` receives relayed prompts when this client is the target.
    pub fn spawn(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        sink: Option<Arc<dyn PromptSink>>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            session: ClientSession::new(&config),
            machine: ReconnectStateMachine::new(config.reconnect),
            config,
            connector,
            sink,
            commands: cmd_rx,
            events: event_tx,
        };
        let task = tokio::spawn(driver.run());

        (
            Self {
                commands: cmd_tx,
                task,
            },
            event_rx,
        )
    }

    /// Sends `text` now if the link is up and authenticated, and queues it
    /// while offline or pairing.  Returns
    /// [`SubmitOutcome::NotAuthenticated`] once the relay has rejected the
    /// join credential.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] once the client has shut down.
    pub async fn submit_prompt(&self, text: impl Into<String>) -> Result<SubmitOutcome, ClientError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .map_err(|_| ClientError::Closed)?;
        outcome.await.map_err(|_| ClientError::Closed)
    }

    /// Manual reconnect.  Leaves `Failed` with a fresh attempt budget, or
    /// cuts a pending retry delay short.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.commands
            .send(Command::Reconnect)
            .map_err(|_| ClientError::Closed)
    }

    /// Closes the link and waits for the driver to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

enum Waited<T> {
    Done(T),
    Reconnect,
    Shutdown,
}

enum Exit {
    Lost,
    Shutdown,
}

struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    sink: Option<Arc<dyn PromptSink>>,
    machine: ReconnectStateMachine,
    session: ClientSession,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Driver {
    async fn run(mut self) {
        self.machine.connect();
        self.emit_state();

        loop {
            match self.open().await {
                Waited::Done(Some(link)) => {
                    self.machine.on_open();
                    self.emit_state();
                    info!(url = %self.config.url.socket_url(), "connected to relay");
                    let exit = self.run_connected(link).await;
                    self.session.on_close();
                    if let Exit::Shutdown = exit {
                        break;
                    }
                }
                Waited::Done(None) | Waited::Reconnect => {}
                Waited::Shutdown => break,
            }

            if !self.after_close().await {
                break;
            }
        }

        self.machine.stop();
        debug!("client driver stopped");
    }

    /// One connect attempt, bounded by the connect timeout.
    async fn open(&mut self) -> Waited<Option<Box<dyn Link>>> {
        let connector = Arc::clone(&self.connector);
        let url = self.config.url.socket_url();
        let limit = self.config.connect_timeout;
        let attempt = async move { timeout(limit, connector.connect(&url)).await };

        match self.wait(attempt, false).await {
            Waited::Done(Ok(Ok(link))) => Waited::Done(Some(link)),
            Waited::Done(Ok(Err(e))) => {
                warn!("connect failed: {e}");
                Waited::Done(None)
            }
            Waited::Done(Err(_)) => {
                warn!("{}", ClientError::Timeout(limit));
                Waited::Done(None)
            }
            Waited::Reconnect => Waited::Reconnect,
            Waited::Shutdown => Waited::Shutdown,
        }
    }

    /// Feeds a lost link (or failed attempt) to the state machine and waits
    /// for whatever it decides.  Returns `false` on shutdown.
    async fn after_close(&mut self) -> bool {
        match self.machine.on_close() {
            ReconnectAction::Retry { attempt, delay } => {
                self.emit_state();
                self.emit(ClientEvent::ReconnectScheduled { attempt, delay });
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

                if let Waited::Shutdown = self.wait(sleep(delay), true).await {
                    return false;
                }
                self.machine.on_retry_due();
                self.emit_state();
                true
            }
            ReconnectAction::GiveUp => {
                self.emit_state();
                self.emit(ClientEvent::Failed);
                warn!("reconnect attempts exhausted; waiting for a manual reconnect");

                match self.wait(std::future::pending::<()>(), true).await {
                    Waited::Shutdown => false,
                    Waited::Done(()) | Waited::Reconnect => {
                        self.machine.connect();
                        self.emit_state();
                        true
                    }
                }
            }
            ReconnectAction::Idle => false,
        }
    }

    /// Drives an open link until it is lost or the client shuts down.
    async fn run_connected(&mut self, mut link: Box<dyn Link>) -> Exit {
        for frame in self.session.on_open() {
            if Self::send(link.as_mut(), &frame).await.is_err() {
                return Exit::Lost;
            }
        }
        if self.flush(link.as_mut()).await.is_err() {
            return Exit::Lost;
        }

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                inbound = link.recv() => match inbound {
                    Some(Ok(text)) => {
                        if self.on_frame(link.as_mut(), &text).await.is_err() {
                            return Exit::Lost;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("link failed: {e}");
                        return Exit::Lost;
                    }
                    None => {
                        info!("relay closed the link");
                        return Exit::Lost;
                    }
                },

                _ = heartbeat.tick() => {
                    let stamp = unix_millis(SystemTime::now());
                    match self.session.heartbeat(Instant::now(), stamp) {
                        Heartbeat::Ping(ping) => {
                            if Self::send(link.as_mut(), &ping).await.is_err() {
                                return Exit::Lost;
                            }
                        }
                        Heartbeat::Dead => {
                            warn!("no pong within two heartbeat intervals; closing link");
                            link.close().await;
                            return Exit::Lost;
                        }
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Submit { text, reply }) => {
                        let (outcome, sent) = self.submit_connected(link.as_mut(), text).await;
                        let _ = reply.send(outcome);
                        if !sent {
                            return Exit::Lost;
                        }
                    }
                    Some(Command::Reconnect) => debug!("already connected; reconnect ignored"),
                    Some(Command::Shutdown) | None => {
                        link.close().await;
                        return Exit::Shutdown;
                    }
                },
            }
        }
    }

    async fn on_frame(&mut self, link: &mut dyn Link, text: &str) -> Result<(), ClientError> {
        let msg = match decode_server_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("ignoring undecodable frame: {e}");
                return Ok(());
            }
        };

        let inbound = self.session.on_message(msg);
        if let Some(prompt) = inbound.relay {
            match &self.sink {
                Some(sink) => sink.deliver_prompt(&prompt),
                None => warn!("prompt relayed but no prompt sink is attached"),
            }
        }
        for event in inbound.events {
            self.emit(event);
        }
        if inbound.flush {
            self.flush(link).await?;
        }
        Ok(())
    }

    /// Returns the outcome and whether the link is still usable.
    async fn submit_connected(&mut self, link: &mut dyn Link, text: String) -> (SubmitOutcome, bool) {
        let retry_text = text.clone();
        match self.session.submit(text, true, SystemTime::now()) {
            Submit::Send(frame) => match Self::send(link, &frame).await {
                Ok(()) => (SubmitOutcome::Sent, true),
                Err(_) => {
                    self.queue(retry_text);
                    (SubmitOutcome::Queued, false)
                }
            },
            Submit::Queued {
                queued,
                dropped_oldest,
            } => {
                self.emit(ClientEvent::PromptQueued {
                    queued,
                    dropped_oldest,
                });
                (SubmitOutcome::Queued, true)
            }
            Submit::NotAuthenticated => {
                warn!("prompt refused: not authenticated with the relay");
                (SubmitOutcome::NotAuthenticated, true)
            }
        }
    }

    fn queue(&mut self, text: String) -> SubmitOutcome {
        if let Submit::Queued {
            queued,
            dropped_oldest,
        } = self.session.submit(text, false, SystemTime::now())
        {
            self.emit(ClientEvent::PromptQueued {
                queued,
                dropped_oldest,
            });
        }
        SubmitOutcome::Queued
    }

    /// Sends every queued prompt in order.  On failure the unsent remainder
    /// goes back to the front of the queue.
    async fn flush(&mut self, link: &mut dyn Link) -> Result<(), ClientError> {
        let queued = self.session.drain_queue();
        if queued.is_empty() {
            return Ok(());
        }
        info!(count = queued.len(), "flushing offline queue");

        let mut pending = queued.into_iter();
        while let Some(entry) = pending.next() {
            let sent = match self.session.prompt_message(&entry.item) {
                Some(frame) => Self::send(link, &frame).await,
                None => Err(ClientError::Closed),
            };
            if let Err(e) = sent {
                let mut rest = vec![entry];
                rest.extend(pending);
                self.session.requeue(rest);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn send(link: &mut dyn Link, msg: &ClientMessage) -> Result<(), ClientError> {
        let text = encode_client_message(msg)?;
        debug!(msg_type = msg.type_name(), "outbound frame");
        link.send(text).await
    }

    /// Awaits `fut` while serving commands.  Submits are queued; a reconnect
    /// interrupts the wait only when `reconnect_interrupts` is set.
    async fn wait<F>(&mut self, fut: F, reconnect_interrupts: bool) -> Waited<F::Output>
    where
        F: Future,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Waited::Done(out),
                command = self.commands.recv() => match command {
                    Some(Command::Submit { text, reply }) => {
                        let outcome = self.queue(text);
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Reconnect) if reconnect_interrupts => return Waited::Reconnect,
                    Some(Command::Reconnect) => {}
                    Some(Command::Shutdown) | None => return Waited::Shutdown,
                },
            }
        }
    }

    fn emit_state(&self) {
        self.emit(ClientEvent::StateChanged(self.machine.state()));
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
