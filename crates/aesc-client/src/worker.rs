//! Per-channel worker task.
//!
//! Each channel owns one spawned worker: the single logical execution
//! context from which every FSM transition is observed. The worker
//! multiplexes handle commands, inbound frames and cancellation, sends
//! the FSM's frames, and awaits its sign requests through the broker.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use aesc_core::ChannelError;
use aesc_rpc::types::{classify, InboundFrame, OutboundFrame};

use crate::actions::{LeaveResult, PendingAction};
use crate::correlator::Correlator;
use crate::fsm::{ChannelFsm, FsmOutput};
use crate::signer::{SignBroker, SignOutcome};
use crate::transport::{Transport, TransportEvent};

/// Commands from the `Channel` handle.
pub(crate) enum Command {
    /// Submit a co-signed action.
    Action(PendingAction),
    /// Request `leave`.
    Leave(oneshot::Sender<Result<LeaveResult, ChannelError>>),
    /// Correlated query.
    Call {
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, ChannelError>>,
    },
    /// Fire-and-forget notification.
    Notify { method: String, params: Value },
    /// Graceful disconnect.
    Disconnect(oneshot::Sender<()>),
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Worker {
    transport: Transport,
    inbound: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    fsm: ChannelFsm,
    correlator: Correlator,
    broker: SignBroker,
    cancel: CancellationToken,
    /// Log wire frames at info level (`debug` channel option).
    verbose_wire: bool,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Transport,
        inbound: mpsc::Receiver<TransportEvent>,
        commands: mpsc::Receiver<Command>,
        fsm: ChannelFsm,
        broker: SignBroker,
        cancel: CancellationToken,
        verbose_wire: bool,
    ) -> Self {
        Self {
            transport,
            inbound,
            commands,
            fsm,
            correlator: Correlator::new(),
            broker,
            cancel,
            verbose_wire,
        }
    }

    /// Drive the channel session until disconnect or transport loss.
    #[instrument(skip_all, name = "channel_worker")]
    pub async fn run(mut self) {
        self.fsm.on_connected();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("worker cancelled");
                    self.shutdown(None).await;
                    return;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone; release the session.
                        self.shutdown(None).await;
                        return;
                    };
                    match self.handle_command(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => return,
                        Err(e) => {
                            self.fail(&e).await;
                            return;
                        }
                    }
                }
                event = self.inbound.recv() => {
                    match event {
                        Some(TransportEvent::Frame(text)) => {
                            if let Err(e) = self.on_frame(&text).await {
                                self.fail(&e).await;
                                return;
                            }
                        }
                        Some(TransportEvent::Closed(reason)) => {
                            info!(?reason, "remote closed the channel session");
                            self.fsm.connection_lost(reason.as_deref());
                            self.correlator.teardown("connection closed by remote");
                            return;
                        }
                        None => {
                            self.fsm.connection_lost(Some("transport reader stopped"));
                            self.correlator.teardown("transport reader stopped");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow, ChannelError> {
        match command {
            Command::Action(action) => {
                let output = self.fsm.submit_action(action);
                self.process_output(output).await?;
            }
            Command::Leave(reply) => {
                let output = self.fsm.submit_leave(reply);
                self.process_output(output).await?;
            }
            Command::Call {
                method,
                params,
                reply,
            } => {
                let frame = self.correlator.register(method, params, reply);
                self.send_frame(&frame).await?;
            }
            Command::Notify { method, params } => {
                self.send_frame(&OutboundFrame::notification(method, params))
                    .await?;
            }
            Command::Disconnect(reply) => {
                self.shutdown(Some(reply)).await;
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    async fn on_frame(&mut self, text: &str) -> Result<(), ChannelError> {
        if self.verbose_wire {
            info!(frame = text, "<- node");
        } else {
            debug!(frame = text, "<- node");
        }
        match classify(text) {
            Ok(InboundFrame::Response { id, result }) => {
                let _ = self.correlator.resolve(&id, result);
            }
            Ok(InboundFrame::Error {
                id: Some(id),
                error,
            }) => {
                let _ = self.correlator.reject(&id, error);
            }
            Ok(InboundFrame::Error { id: None, error }) => {
                self.correlator.record_error(error.clone());
                let raw: Value = serde_json::from_str(text).unwrap_or(Value::Null);
                let output = self.fsm.handle_error_frame(&error, raw);
                self.process_output(output).await?;
            }
            Ok(InboundFrame::Notification { method, params }) => {
                let output = self.fsm.handle_notification(&method, params);
                self.process_output(output).await?;
            }
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
            }
        }
        Ok(())
    }

    /// Send the FSM's frames and resolve its sign request, if any.
    async fn process_output(&mut self, output: FsmOutput) -> Result<(), ChannelError> {
        for frame in &output.frames {
            self.send_frame(frame).await?;
        }
        let Some(sign) = output.sign else {
            return Ok(());
        };

        let outcome = if sign.use_action_signer {
            match self.fsm.pending_action_signer() {
                Some(signer) => {
                    self.broker
                        .sign_action(signer.as_ref(), &sign.tx, &sign.meta)
                        .await
                }
                None => SignOutcome::Rejected,
            }
        } else {
            self.broker.sign_tagged(sign.tag, &sign.tx, &sign.meta).await
        };

        let followup = self.fsm.sign_completed(outcome);
        debug_assert!(followup.sign.is_none(), "sign completion must not re-sign");
        for frame in &followup.frames {
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), ChannelError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| ChannelError::Connection(format!("frame encode failed: {e}")))?;
        if self.verbose_wire {
            info!(frame = %text, "-> node");
        } else {
            debug!(frame = %text, "-> node");
        }
        self.transport.send(text).await
    }

    async fn fail(&mut self, error: &ChannelError) {
        warn!(error = %error, "channel worker failing");
        self.fsm.connection_lost(Some(&error.to_string()));
        self.correlator.teardown(&error.to_string());
    }

    async fn shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
        self.fsm.disconnected_by_caller();
        self.correlator.teardown("disconnect requested");
        self.transport.close().await;
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }
}
