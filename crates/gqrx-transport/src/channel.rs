//! Public handle to a command channel

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use gqrx_protocol::{Command, Frame};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::dispatcher::{Dispatcher, PendingCommand, PendingSlot, Request};
use crate::error::{ChannelError, ChannelResult};
use crate::state::{ChannelEvent, ConnectionState};
use crate::transport::{Transport, TransportEvent};

/// Default time allowed for the TCP handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configures and opens a [`CommandChannel`].
///
/// Subscribe to lifecycle events here to also observe the initial
/// `Connected` (or connection failure) notification. The state watch starts
/// `Disconnected` and reads `Connecting` while the TCP handshake runs.
pub struct ChannelBuilder {
    connect_timeout: Duration,
    events: broadcast::Sender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            events,
            state,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect to the daemon over TCP.
    pub async fn connect(self, host: &str, port: u16) -> ChannelResult<CommandChannel> {
        self.state.send_replace(ConnectionState::Connecting);
        match Transport::connect(host, port, self.connect_timeout).await {
            Ok((transport, inbound)) => Ok(self.spawn(transport, inbound)),
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                let _ = self.events.send(ChannelEvent::Error {
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run the channel over an already connected stream.
    pub fn attach<S>(self, stream: S, peer: impl Into<String>) -> CommandChannel
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, inbound) = Transport::from_stream(stream, peer);
        self.spawn(transport, inbound)
    }

    fn spawn(
        self,
        mut transport: Transport,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> CommandChannel {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        transport.publish_state(self.state);
        let state = transport.subscribe_state();
        let pending = Arc::new(AtomicUsize::new(0));
        let _ = self.events.send(ChannelEvent::Connected {
            peer: transport.peer().to_string(),
        });

        let dispatcher = Dispatcher::new(transport, self.events.clone());
        tokio::spawn(dispatcher.run(requests_rx, inbound));

        CommandChannel {
            requests,
            state,
            events: self.events,
            next_ordinal: Arc::new(AtomicU64::new(0)),
            pending,
        }
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle for submitting commands over one connection.
///
/// Commands from all clones share a single FIFO queue and are written one
/// at a time; completions arrive in submission order.
#[derive(Clone)]
pub struct CommandChannel {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ChannelEvent>,
    next_ordinal: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl CommandChannel {
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    /// Connect with default settings.
    pub async fn connect(host: &str, port: u16) -> ChannelResult<Self> {
        ChannelBuilder::new().connect(host, port).await
    }

    /// Queue a command. Fails at once when the connection is not open.
    pub fn submit(&self, command: Command, timeout: Duration) -> ChannelResult<CommandHandle> {
        let state = *self.state.borrow();
        if !state.is_connected() {
            return Err(ChannelError::Connection(format!(
                "cannot submit {:?}: connection is {}",
                command.text(),
                state
            )));
        }

        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let (reply, completion) = oneshot::channel();
        let pending = PendingCommand {
            ordinal,
            command,
            submitted_at: Instant::now(),
            timeout,
            reply,
            slot: PendingSlot::acquire(&self.pending),
        };

        self.requests
            .send(Request::Submit(pending))
            .map_err(|_| ChannelError::Connection("dispatcher has stopped".into()))?;

        Ok(CommandHandle { ordinal, completion })
    }

    /// Submit and wait for the reply.
    pub async fn execute(&self, command: Command, timeout: Duration) -> ChannelResult<Frame> {
        self.submit(command, timeout)?.await
    }

    /// Withdraw a command that has not been written yet.
    ///
    /// Returns `false` if the command is already in flight or finished; an
    /// in-flight command can only be abandoned by closing the channel.
    pub async fn cancel(&self, handle: &CommandHandle) -> bool {
        let (reply, answer) = oneshot::channel();
        if self
            .requests
            .send(Request::Cancel {
                ordinal: handle.ordinal,
                reply,
            })
            .is_err()
        {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Reject everything pending, send `q` and close the socket.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.requests.send(Request::Close { reply }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Commands submitted and not yet resolved, whether queued or in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Completion handle of a submitted command. Await it for the reply.
#[derive(Debug)]
pub struct CommandHandle {
    ordinal: u64,
    completion: oneshot::Receiver<ChannelResult<Frame>>,
}

impl CommandHandle {
    /// Submission sequence number
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl Future for CommandHandle {
    type Output = ChannelResult<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.completion).poll(cx).map(|result| {
            result.unwrap_or_else(|_| Err(ChannelError::Connection("dispatcher has stopped".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use gqrx_protocol::{ProtocolError, ReplyKind, ReplyShape, ReportCode};
    use tokio::io::{
        AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadBuf, ReadHalf,
        WriteHalf,
    };

    const LONG: Duration = Duration::from_secs(2);

    /// Server end of an in-memory connection
    struct FakeDaemon {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeDaemon {
        async fn read_line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        async fn reply(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        /// Nothing else is written for the given window
        async fn assert_idle(&mut self, window: Duration) {
            let result = tokio::time::timeout(window, self.read_line()).await;
            assert!(result.is_err(), "unexpected write: {:?}", result);
        }
    }

    /// A connection whose writes fail and whose reads never complete
    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn open() -> (CommandChannel, FakeDaemon) {
        let (client, server) = tokio::io::duplex(4096);
        let channel = ChannelBuilder::new().attach(client, "fake");
        let (read_half, writer) = tokio::io::split(server);
        let daemon = FakeDaemon {
            reader: BufReader::new(read_half),
            writer,
        };
        (channel, daemon)
    }

    #[tokio::test]
    async fn test_replies_follow_submission_order() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::level("SQL"), LONG).unwrap();
        let h2 = channel.submit(Command::level("STRENGTH"), LONG).unwrap();
        let h3 = channel.submit(Command::frequency(), LONG).unwrap();
        assert_eq!(channel.pending(), 3);

        let replies = [
            ("l SQL\n", "-60\n"),
            ("l STRENGTH\n", "-42.5\n"),
            ("f\n", "145288000\n"),
        ];
        for (expected, reply) in replies {
            assert_eq!(daemon.read_line().await, expected);
            // Only one command on the wire until it is answered
            daemon.assert_idle(Duration::from_millis(30)).await;
            daemon.reply(reply.as_bytes()).await;
        }

        assert_eq!(h1.await.unwrap().as_str(), "-60");
        assert_eq!(h2.await.unwrap().as_str(), "-42.5");
        assert_eq!(h3.await.unwrap().as_str(), "145288000");
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn test_pending_counts_commands_not_yet_dispatched() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::version(), LONG).unwrap();
        assert_eq!(channel.pending(), 1);
        let h2 = channel.submit(Command::frequency(), LONG).unwrap();
        assert_eq!(channel.pending(), 2);

        assert_eq!(daemon.read_line().await, "_\n");
        assert!(channel.cancel(&h2).await);
        assert_eq!(channel.pending(), 1);

        daemon.reply(b"2.17.5\n").await;
        assert_eq!(h1.await.unwrap().as_str(), "2.17.5");
        assert_eq!(channel.pending(), 0);
        assert!(matches!(h2.await, Err(ChannelError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_unbounded_timeout_keeps_dispatcher_running() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::frequency(), Duration::MAX).unwrap();
        assert_eq!(daemon.read_line().await, "f\n");
        daemon.reply(b"145288000\n").await;
        assert_eq!(h1.await.unwrap().as_str(), "145288000");

        let h2 = channel.submit(Command::version(), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "_\n");
        daemon.reply(b"2.17.5\n").await;
        assert_eq!(h2.await.unwrap().as_str(), "2.17.5");
        assert_eq!(channel.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_wins_over_pending_bytes() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::frequency(), Duration::from_millis(50)).unwrap();
        assert_eq!(daemon.read_line().await, "f\n");

        // The reply is on the wire but only read once the deadline has passed
        daemon.reply(b"145288000\n").await;
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(matches!(h1.await, Err(ChannelError::Timeout { .. })));

        let h2 = channel.submit(Command::version(), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "_\n");
        assert_eq!(h2.await.unwrap().as_str(), "145288000");
    }

    #[tokio::test]
    async fn test_concurrent_submitters_get_their_own_replies() {
        let (channel, mut daemon) = open();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let channel = channel.clone();
            tasks.push(tokio::spawn(async move {
                let text = format!("l LEVEL{}", i);
                let command = Command::raw(text.clone(), ReplyShape::SingleLine, ReplyKind::Value);
                let frame = channel.execute(command, LONG).await.unwrap();
                (text, frame.into_string())
            }));
        }

        for _ in 0..8 {
            let line = daemon.read_line().await;
            let reply = format!("echo {}\n", line.trim_end());
            daemon.reply(reply.as_bytes()).await;
        }

        for task in tasks {
            let (text, reply) = task.await.unwrap();
            assert_eq!(reply, format!("echo {}", text));
        }
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected_without_writing() {
        let (channel, mut daemon) = open();

        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Closed);

        let result = channel.submit(Command::frequency(), LONG);
        assert!(matches!(result, Err(ChannelError::Connection(_))));

        let mut written = String::new();
        daemon.reader.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "q\n");
    }

    #[tokio::test]
    async fn test_submit_after_remote_close_is_rejected() {
        let (channel, daemon) = open();
        drop(daemon);

        let mut state = channel.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        let result = channel.submit(Command::frequency(), LONG);
        assert!(matches!(result, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_chunked_reply_is_reassembled() {
        let (channel, mut daemon) = open();

        let mut handle = channel.submit(Command::set_frequency(851_872_000), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "F 851872000\n");

        daemon.reply(b"RPR").await;
        assert!(tokio::time::timeout(Duration::from_millis(30), &mut handle)
            .await
            .is_err());

        daemon.reply(b"T 0\n").await;
        assert_eq!(handle.await.unwrap().as_str(), "RPRT 0");
    }

    #[tokio::test]
    async fn test_multi_line_reply() {
        let (channel, mut daemon) = open();

        let handle = channel.submit(Command::mode_and_passband(), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "m\n");
        daemon.reply(b"WFM_ST\n").await;
        daemon.reply(b"160000\n").await;

        assert_eq!(handle.await.unwrap().as_str(), "WFM_ST\n160000");
    }

    #[tokio::test]
    async fn test_timeout_rejects_only_that_command() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::frequency(), Duration::from_millis(50)).unwrap();
        let h2 = channel.submit(Command::version(), LONG).unwrap();

        assert_eq!(daemon.read_line().await, "f\n");
        // The next command waits for the timeout
        daemon.assert_idle(Duration::from_millis(25)).await;

        match h1.await {
            Err(ChannelError::Timeout { command, timeout }) => {
                assert_eq!(command, "f");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        assert_eq!(daemon.read_line().await, "_\n");
        daemon.reply(b"2.17.5\n").await;
        assert_eq!(h2.await.unwrap().as_str(), "2.17.5");
        assert_eq!(channel.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_late_reply_is_paired_with_next_command() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::frequency(), Duration::from_millis(20)).unwrap();
        assert_eq!(daemon.read_line().await, "f\n");
        assert!(matches!(h1.await, Err(ChannelError::Timeout { .. })));

        // Known hazard: no request ids, so the stale reply answers the next command
        daemon.reply(b"145288000\n").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let h2 = channel.submit(Command::version(), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "_\n");
        assert_eq!(h2.await.unwrap().as_str(), "145288000");
    }

    #[tokio::test]
    async fn test_transport_failure_rejects_everything() {
        let (channel, mut daemon) = open();
        let mut events = channel.subscribe();

        let h1 = channel.submit(Command::frequency(), LONG).unwrap();
        let h2 = channel.submit(Command::level("SQL"), LONG).unwrap();
        let h3 = channel.submit(Command::level("STRENGTH"), LONG).unwrap();

        assert_eq!(daemon.read_line().await, "f\n");
        drop(daemon);

        for handle in [h1, h2, h3] {
            assert!(matches!(handle.await, Err(ChannelError::Connection(_))));
        }

        let mut state = channel.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(channel.pending(), 0);
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_failure_rejects_queued_commands() {
        let builder = ChannelBuilder::new();
        let mut events = builder.subscribe();
        let channel = builder.attach(BrokenPipe, "broken");
        assert!(matches!(events.recv().await.unwrap(), ChannelEvent::Connected { .. }));

        let handles = [
            channel.submit(Command::frequency(), LONG).unwrap(),
            channel.submit(Command::level("SQL"), LONG).unwrap(),
            channel.submit(Command::level("STRENGTH"), LONG).unwrap(),
        ];
        for handle in handles {
            assert!(matches!(handle.await, Err(ChannelError::Connection(_))));
        }

        let mut state = channel.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(channel.pending(), 0);

        match events.recv().await.unwrap() {
            ChannelEvent::Error { detail } => assert!(detail.contains("write failed"), "{detail}"),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected { .. }
        ));

        let result = channel.submit(Command::frequency(), LONG);
        assert!(matches!(result, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_cancel_queued_command() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::version(), LONG).unwrap();
        let h2 = channel.submit(Command::frequency(), LONG).unwrap();
        let h3 = channel.submit(Command::level("SQL"), LONG).unwrap();

        assert_eq!(daemon.read_line().await, "_\n");
        assert!(!channel.cancel(&h1).await, "in-flight command cannot be cancelled");
        assert!(channel.cancel(&h2).await);
        assert!(!channel.cancel(&h2).await);
        assert_eq!(channel.pending(), 2);

        daemon.reply(b"2.17.5\n").await;
        assert_eq!(h1.await.unwrap().as_str(), "2.17.5");

        // The cancelled command never reaches the wire
        assert_eq!(daemon.read_line().await, "l SQL\n");
        daemon.reply(b"-50\n").await;
        assert_eq!(h3.await.unwrap().as_str(), "-50");

        match h2.await {
            Err(ChannelError::Cancelled { command }) => assert_eq!(command, "f"),
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_error_is_local() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::set_frequency(1), LONG).unwrap();
        let h2 = channel.submit(Command::aos(), LONG).unwrap();

        assert_eq!(daemon.read_line().await, "F 1\n");
        daemon.reply(b"RPRT 1\n").await;
        assert_eq!(daemon.read_line().await, "AOS\n");
        daemon.reply(b"RPRT 0\n").await;

        assert_eq!(
            h1.await,
            Err(ChannelError::Command {
                command: "F 1".into(),
                code: ReportCode(1)
            })
        );
        assert!(h2.await.is_ok());
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_connection_open() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::set_level("SQL", -60.0), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "L SQL -60\n");
        daemon.reply(b"what?\n").await;
        assert!(matches!(
            h1.await,
            Err(ChannelError::Protocol(ProtocolError::MalformedReport(_)))
        ));

        let h2 = channel.submit(Command::level("SQL"), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "l SQL\n");
        daemon.reply(b"-60\n").await;
        assert_eq!(h2.await.unwrap().as_str(), "-60");
    }

    #[tokio::test]
    async fn test_close_rejects_pending_and_is_idempotent() {
        let (channel, mut daemon) = open();

        let h1 = channel.submit(Command::frequency(), LONG).unwrap();
        assert_eq!(daemon.read_line().await, "f\n");

        channel.close().await;
        channel.close().await;

        assert!(matches!(h1.await, Err(ChannelError::Connection(_))));
        assert_eq!(daemon.read_line().await, "q\n");
        assert_eq!(daemon.read_line().await, "");
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (client, _server) = tokio::io::duplex(64);
        let builder = ChannelBuilder::new();
        let mut events = builder.subscribe();
        let channel = builder.attach(client, "fake");

        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Connected { peer: "fake".into() }
        );

        channel.close().await;
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let builder = ChannelBuilder::new().connect_timeout(Duration::from_secs(1));
        let mut events = builder.subscribe();
        let result = builder.connect("127.0.0.1", port).await;

        assert!(matches!(result, Err(ChannelError::Connection(_))));
        assert!(matches!(events.recv().await.unwrap(), ChannelEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_connect_publishes_connecting_state() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let builder = ChannelBuilder::new();
        let state = builder.watch_state();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        let connect = builder.connect("127.0.0.1", port);
        tokio::pin!(connect);

        // First poll starts the handshake, which cannot finish before the
        // reactor has run
        let finished = tokio::select! {
            biased;
            result = &mut connect => Some(result),
            _ = std::future::ready(()) => None,
        };
        assert!(finished.is_none());
        assert_eq!(*state.borrow(), ConnectionState::Connecting);

        let channel = connect.await.unwrap();
        assert_eq!(*state.borrow(), ConnectionState::Connected);
        assert_eq!(channel.state(), ConnectionState::Connected);

        let (_stream, _) = listener.accept().await.unwrap();
        channel.close().await;
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let builder = ChannelBuilder::new();
        let state = builder.watch_state();
        assert!(builder.connect("127.0.0.1", port).await.is_err());
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }
}
