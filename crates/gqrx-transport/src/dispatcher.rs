//! Command dispatcher - owns the queue and pairs replies with commands

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gqrx_protocol::{classify, Command, Frame, FrameReassembler, Outcome};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::state::{ChannelEvent, ConnectionState};
use crate::transport::{Transport, TransportEvent};

/// Requests sent from channel handles to the dispatcher task
pub(crate) enum Request {
    Submit(PendingCommand),
    Cancel {
        ordinal: u64,
        reply: oneshot::Sender<bool>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Upper bound for a command deadline when the requested timeout does not fit
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Counts a command in the channel's pending total for as long as it lives.
pub(crate) struct PendingSlot(Arc<AtomicUsize>);

impl PendingSlot {
    pub(crate) fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        PendingSlot(counter.clone())
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A submitted command waiting for its reply
pub(crate) struct PendingCommand {
    pub ordinal: u64,
    pub command: Command,
    pub submitted_at: Instant,
    pub timeout: Duration,
    pub reply: oneshot::Sender<ChannelResult<Frame>>,
    pub slot: PendingSlot,
}

impl PendingCommand {
    fn resolve(self, result: ChannelResult<Frame>) {
        let PendingCommand {
            ordinal, reply, slot, ..
        } = self;
        // Released first so a woken caller never sees itself still counted
        drop(slot);
        if reply.send(result).is_err() {
            debug!(ordinal, "Caller dropped its handle before completion");
        }
    }

    fn deadline(&self, now: Instant) -> Instant {
        now.checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }
}

struct InFlight {
    pending: PendingCommand,
    deadline: Instant,
}

/// Single owner of the transport, the reassembly buffer and the command queue.
///
/// Runs as one spawned task: at most one command is on the wire at a time and
/// replies are paired with commands purely by arrival order.
pub(crate) struct Dispatcher {
    transport: Transport,
    reassembler: FrameReassembler,
    queue: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Dispatcher {
    pub(crate) fn new(transport: Transport, events: broadcast::Sender<ChannelEvent>) -> Self {
        Self {
            transport,
            reassembler: FrameReassembler::new(),
            queue: VecDeque::new(),
            in_flight: None,
            events,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut inbound: mpsc::Receiver<TransportEvent>,
    ) {
        loop {
            let deadline = self.in_flight.as_ref().map(|f| f.deadline);

            // Inbound bytes are polled first so a reply that is already
            // buffered wins over a request; an expired deadline is still
            // honoured on the inbound path (see `on_bytes`).
            let flow = tokio::select! {
                biased;

                event = inbound.recv() => self.on_transport_event(event).await,

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timeout();
                    ControlFlow::Continue(())
                }

                request = requests.recv() => match request {
                    Some(Request::Submit(pending)) => {
                        self.enqueue(pending);
                        ControlFlow::Continue(())
                    }
                    Some(Request::Cancel { ordinal, reply }) => {
                        let _ = reply.send(self.cancel(ordinal));
                        ControlFlow::Continue(())
                    }
                    Some(Request::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        ControlFlow::Break(())
                    }
                    None => {
                        debug!("All channel handles dropped");
                        self.shutdown().await;
                        ControlFlow::Break(())
                    }
                },
            };

            if flow.is_break() || self.pump().await.is_break() {
                break;
            }
        }

        // Anything that raced with the shutdown is answered here
        requests.close();
        while let Ok(request) = requests.try_recv() {
            match request {
                Request::Submit(pending) => pending.resolve(Err(ChannelError::Connection(format!(
                    "connection is {}",
                    self.transport.state()
                )))),
                Request::Cancel { reply, .. } => {
                    let _ = reply.send(false);
                }
                Request::Close { reply } => {
                    let _ = reply.send(());
                }
            }
        }
        debug!(peer = %self.transport.peer(), "Dispatcher stopped");
    }

    fn enqueue(&mut self, pending: PendingCommand) {
        debug!(
            ordinal = pending.ordinal,
            command = %pending.command,
            queued = self.queue.len(),
            "Command queued"
        );
        self.queue.push_back(pending);
    }

    /// Write queued commands while nothing is in flight.
    async fn pump(&mut self) -> ControlFlow<()> {
        while self.in_flight.is_none() && self.transport.state().is_connected() {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };

            if let Err(e) = self.transport.write(&pending.command.encode()).await {
                let reason = format!("write failed: {}", e);
                let _ = self.events.send(ChannelEvent::Error { detail: reason.clone() });
                self.queue.push_front(pending);
                self.connection_lost(reason).await;
                return ControlFlow::Break(());
            }

            debug!(
                ordinal = pending.ordinal,
                command = %pending.command,
                waited_ms = pending.submitted_at.elapsed().as_millis() as u64,
                "Command dispatched"
            );
            let deadline = pending.deadline(Instant::now());
            self.in_flight = Some(InFlight { pending, deadline });

            // A late reply to an earlier command may already be buffered
            self.drain_frames();
        }
        ControlFlow::Continue(())
    }

    async fn on_transport_event(&mut self, event: Option<TransportEvent>) -> ControlFlow<()> {
        match event {
            Some(TransportEvent::Data(bytes)) => {
                self.on_bytes(&bytes);
                ControlFlow::Continue(())
            }
            Some(TransportEvent::Failed(detail)) => {
                let _ = self.events.send(ChannelEvent::Error { detail: detail.clone() });
                self.connection_lost(detail).await;
                ControlFlow::Break(())
            }
            Some(TransportEvent::Closed) | None => {
                self.connection_lost("connection closed by daemon".to_string()).await;
                ControlFlow::Break(())
            }
        }
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        // A steady stream of bytes must not hold off an expired deadline
        let expired = self
            .in_flight
            .as_ref()
            .map_or(false, |f| f.deadline <= Instant::now());
        if expired {
            self.on_timeout();
        }

        if let Err(e) = self.reassembler.feed(bytes) {
            warn!(error = %e, "Discarding unframed data");
            self.reject_in_flight(e.into());
            return;
        }
        if self.in_flight.is_none() {
            warn!(
                bytes = bytes.len(),
                buffered = self.reassembler.buffered(),
                "Received data with no command in flight"
            );
        }
        self.drain_frames();
    }

    fn drain_frames(&mut self) {
        while let Some(shape) = self.in_flight.as_ref().map(|f| f.pending.command.shape()) {
            match self.reassembler.next_frame(shape) {
                Ok(Some(frame)) => self.complete(frame),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Unreadable reply");
                    self.reject_in_flight(e.into());
                }
            }
        }
    }

    fn complete(&mut self, frame: Frame) {
        let Some(InFlight { pending, .. }) = self.in_flight.take() else {
            return;
        };

        let result = match classify(&frame, pending.command.kind()) {
            Ok(Outcome::Success | Outcome::Value) => Ok(frame),
            Ok(Outcome::Failure(code)) => Err(ChannelError::Command {
                command: pending.command.text().to_string(),
                code,
            }),
            Err(e) => Err(e.into()),
        };

        debug!(
            ordinal = pending.ordinal,
            command = %pending.command,
            elapsed_ms = pending.submitted_at.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Command completed"
        );
        pending.resolve(result);
    }

    fn reject_in_flight(&mut self, error: ChannelError) {
        if let Some(InFlight { pending, .. }) = self.in_flight.take() {
            debug!(ordinal = pending.ordinal, error = %error, "Command rejected");
            pending.resolve(Err(error));
        }
    }

    fn on_timeout(&mut self) {
        let Some(InFlight { pending, .. }) = self.in_flight.take() else {
            return;
        };

        // The daemon may still answer; that reply would be paired with the
        // next command dispatched.
        warn!(
            ordinal = pending.ordinal,
            command = %pending.command,
            timeout_ms = pending.timeout.as_millis() as u64,
            buffered = self.reassembler.buffered(),
            "Command timed out; a late reply will be misattributed"
        );
        let error = ChannelError::Timeout {
            command: pending.command.text().to_string(),
            timeout: pending.timeout,
        };
        pending.resolve(Err(error));
    }

    /// Remove a queued command. In-flight and unknown ordinals are refused.
    fn cancel(&mut self, ordinal: u64) -> bool {
        let Some(index) = self.queue.iter().position(|p| p.ordinal == ordinal) else {
            debug!(ordinal, "Cancel refused: command is in flight or finished");
            return false;
        };

        if let Some(pending) = self.queue.remove(index) {
            debug!(ordinal, command = %pending.command, "Command cancelled");
            let command = pending.command.text().to_string();
            pending.resolve(Err(ChannelError::Cancelled { command }));
        }
        true
    }

    fn fail_all(&mut self, reason: &str) {
        let error = ChannelError::Connection(reason.to_string());
        let in_flight = self.in_flight.take().map(|f| f.pending);
        let failed = usize::from(in_flight.is_some()) + self.queue.len();

        for pending in in_flight.into_iter().chain(self.queue.drain(..)) {
            pending.resolve(Err(error.clone()));
        }
        if failed > 0 {
            info!(failed, reason, "Rejected pending commands");
        }
    }

    async fn connection_lost(&mut self, reason: String) {
        warn!(peer = %self.transport.peer(), reason = %reason, "Connection lost");
        self.fail_all(&reason);
        self.transport.close().await;
        self.transport.set_state(ConnectionState::Disconnected);
        self.reassembler.clear();
        let _ = self.events.send(ChannelEvent::Disconnected { reason });
    }

    /// Local close: reject everything, ask the daemon to quit, drop the socket.
    async fn shutdown(&mut self) {
        info!(peer = %self.transport.peer(), "Closing connection");
        self.fail_all("connection closed by client");

        if self.transport.state().is_connected() {
            if let Err(e) = self.transport.write(b"q\n").await {
                debug!(error = %e, "Failed to send quit");
            }
        }
        self.transport.set_state(ConnectionState::Closing);
        self.transport.close().await;
        self.transport.set_state(ConnectionState::Closed);
        self.reassembler.clear();
        let _ = self.events.send(ChannelEvent::Disconnected {
            reason: "closed by client".to_string(),
        });
    }
}
